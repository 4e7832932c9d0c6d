use std::time::Duration;

use tessera_core::Hash;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::agreement::Agreement;
use crate::config::AgreementConfig;
use crate::error::AgreementError;

/// Clock loop that advances an agreement until it confirms a block
pub struct AgreementDriver {
    agreement: Agreement,
    lambda: Duration,
}

impl AgreementDriver {
    pub fn new(agreement: Agreement, config: &AgreementConfig) -> Self {
        AgreementDriver {
            agreement,
            lambda: config.lambda(),
        }
    }

    pub fn agreement(&self) -> &Agreement {
        &self.agreement
    }

    /// Drive the current position to a decision.
    ///
    /// Each state is held for its clock count of λ before advancing. A run
    /// that ends in a fast-forward is resumed at the new period. Returns the
    /// confirmed block hash.
    pub async fn run(&self) -> Result<Hash, AgreementError> {
        let position = self
            .agreement
            .position()
            .await
            .ok_or(AgreementError::NotInitialized)?;
        let mut done = self.agreement.done();
        info!("Driving agreement at {} with λ={}ms", position, self.lambda.as_millis());

        loop {
            if let Some(hash) = self.agreement.confirmed().await {
                info!("Agreement at {} finished with {}", position, hash);
                return Ok(hash);
            }
            if *done.borrow_and_update() {
                self.agreement.resume().await?;
                continue;
            }

            let state = self
                .agreement
                .state()
                .await
                .ok_or(AgreementError::NotInitialized)?;
            if self.agreement.request_votes().await? {
                debug!("Pulling votes for {}", position);
            }

            let wait = self.lambda * state.clocks();
            if !wait.is_zero() {
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = done.changed() => continue,
                }
            }
            self.agreement.advance().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::valid_leader_fn;
    use crate::receiver::{AgreementEvent, ChannelReceiver, TracingForkReporter};
    use crate::signal::SignalType;
    use crate::test_utils::TestCommittee;
    use std::sync::Arc;
    use tessera_core::VoteType;

    #[tokio::test]
    async fn test_driver_returns_on_decide() {
        let committee = TestCommittee::new(4);
        let config = AgreementConfig {
            lambda_ms: 5,
            ..AgreementConfig::default()
        };
        let (receiver, mut events) = ChannelReceiver::new(committee.node_id(0), 64, Arc::new(|| None));
        let agreement = Agreement::new(
            committee.signers[0].clone(),
            Arc::new(receiver),
            Arc::new(TracingForkReporter),
            valid_leader_fn(|_| Ok(true)),
            &config,
        );
        agreement
            .restart(
                committee.position,
                committee.notary_set.clone(),
                committee.node_id(1),
                Hash::random(),
            )
            .await;

        let driver = AgreementDriver::new(agreement.clone(), &config);
        let run = tokio::spawn(async move { driver.run().await });

        // Fast-forward first, so the driver has to resume
        let target = Hash::random();
        let lock = committee.signal(SignalType::Lock, VoteType::PreCommit, target, 3, 3);
        agreement.process_signal(lock).await.unwrap();
        sleep(Duration::from_millis(30)).await;
        assert!(!agreement.is_done().await);
        assert_eq!(agreement.period().await, 3);

        let decide = committee.signal(SignalType::Decide, VoteType::Commit, target, 3, 3);
        agreement.process_signal(decide).await.unwrap();

        let confirmed = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(confirmed, target);

        let mut saw_confirm = false;
        while let Ok(event) = events.try_recv() {
            if let AgreementEvent::Confirmed { block_hash, .. } = event {
                assert_eq!(block_hash, target);
                saw_confirm = true;
            }
        }
        assert!(saw_confirm);
    }

    #[tokio::test]
    async fn test_driver_requires_restart() {
        let committee = TestCommittee::new(4);
        let config = AgreementConfig::default();
        let (receiver, _events) = ChannelReceiver::new(committee.node_id(0), 8, Arc::new(|| None));
        let agreement = Agreement::new(
            committee.signers[0].clone(),
            Arc::new(receiver),
            Arc::new(TracingForkReporter),
            valid_leader_fn(|_| Ok(true)),
            &config,
        );

        let driver = AgreementDriver::new(agreement, &config);
        assert!(matches!(driver.run().await, Err(AgreementError::NotInitialized)));
    }
}
