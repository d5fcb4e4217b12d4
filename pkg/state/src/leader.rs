use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::store::ObjectStore;
use crate::typed::{self, Versioned};

use pkg_constants::state::{
    LEADER_LEASE_KEY, LEADER_LEASE_TTL_SECS, LEADER_RENEW_INTERVAL_DIVISOR,
};

/// A lease record for leader election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub holder_id: String,
    pub acquired_at: chrono::DateTime<Utc>,
    pub renew_at: chrono::DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl Lease {
    pub fn is_expired(&self) -> bool {
        let expiry = self.renew_at + chrono::Duration::seconds(self.ttl_seconds as i64);
        Utc::now() > expiry
    }
}

/// Leader election over a single lease record.
///
/// Acquire, renew and takeover are all compare-and-swap writes against the
/// version that was read, so two servers racing for an expired lease cannot
/// both win. Only the leader runs the pool and claim controllers.
pub struct LeaderElection {
    store: Arc<dyn ObjectStore>,
    server_id: String,
    ttl: Duration,
    renew_interval: Duration,
    leader_tx: watch::Sender<bool>,
    leader_rx: watch::Receiver<bool>,
}

impl LeaderElection {
    pub fn new(store: Arc<dyn ObjectStore>, server_id: String) -> Self {
        let ttl = Duration::from_secs(LEADER_LEASE_TTL_SECS);
        let renew_interval =
            Duration::from_secs(LEADER_LEASE_TTL_SECS / LEADER_RENEW_INTERVAL_DIVISOR);
        let (leader_tx, leader_rx) = watch::channel(false);

        Self {
            store,
            server_id,
            ttl,
            renew_interval,
            leader_tx,
            leader_rx,
        }
    }

    /// Get a receiver to observe leadership changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.leader_rx.clone()
    }

    pub fn is_leader(&self) -> bool {
        *self.leader_rx.borrow()
    }

    fn fresh_lease(&self, acquired_at: chrono::DateTime<Utc>) -> Lease {
        let now = Utc::now();
        Lease {
            holder_id: self.server_id.clone(),
            acquired_at,
            renew_at: now,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    /// Try to acquire or renew the lease. Returns true if we are the leader.
    pub async fn try_acquire_or_renew(&self) -> anyhow::Result<bool> {
        let current: Option<Versioned<Lease>> =
            typed::read(self.store.as_ref(), LEADER_LEASE_KEY).await?;

        let (next, expected) = match current {
            Some(Versioned { version, object: lease }) if lease.holder_id == self.server_id => {
                (self.fresh_lease(lease.acquired_at), Some(version))
            }
            Some(Versioned { version, object: lease }) if lease.is_expired() => {
                info!(
                    "Lease expired (held by {}), acquiring for {}",
                    lease.holder_id, self.server_id
                );
                (self.fresh_lease(Utc::now()), Some(version))
            }
            Some(_) => return Ok(false),
            None => {
                info!("No existing lease found, acquiring for {}", self.server_id);
                (self.fresh_lease(Utc::now()), None)
            }
        };

        match typed::write(self.store.as_ref(), LEADER_LEASE_KEY, &next, expected).await {
            Ok(_) => Ok(true),
            // Someone else wrote the lease between our read and write.
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Start the leader election loop as a background task.
    pub fn start(self) -> (tokio::task::JoinHandle<()>, watch::Receiver<bool>) {
        let rx = self.leader_rx.clone();
        let handle = tokio::spawn(async move {
            info!(
                "LeaderElection started (server_id={}, ttl={}s, renew={}s)",
                self.server_id,
                self.ttl.as_secs(),
                self.renew_interval.as_secs()
            );

            let mut interval = tokio::time::interval(self.renew_interval);
            loop {
                interval.tick().await;

                match self.try_acquire_or_renew().await {
                    Ok(is_leader) => {
                        let was_leader = *self.leader_rx.borrow();
                        if is_leader && !was_leader {
                            info!("This server is now the leader ({})", self.server_id);
                        } else if !is_leader && was_leader {
                            warn!(
                                "Leadership lost for {}, another server took over",
                                self.server_id
                            );
                        }
                        let _ = self.leader_tx.send(is_leader);
                    }
                    Err(e) => {
                        warn!("Leader election error: {}", e);
                        let _ = self.leader_tx.send(false);
                    }
                }
            }
        });

        (handle, rx)
    }
}
