//! Premium-access evaluation: whether a user currently has an active paid
//! subscription, derived from the subscription row and the profile mirror.
//!
//! The two sources can be independently stale, so access is the inclusive OR
//! of both. `PremiumAccessMonitor` keeps a live boolean current without
//! polling callers: one task sleeps until whichever comes first of the
//! 30-second heartbeat or the earliest known expiry instant.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{profile::UserProfile, subscription::UserSubscription};

pub const ACCESS_HEARTBEAT: Duration = Duration::from_secs(30);

/// The billing state known for one user at a point in time.
#[derive(Clone, Debug, Default)]
pub struct AccessSnapshot {
    pub subscription: Option<UserSubscription>,
    pub profile: Option<UserProfile>,
}

pub fn has_premium_access(snapshot: &AccessSnapshot, now: OffsetDateTime) -> bool {
    let by_subscription = snapshot.subscription.as_ref().is_some_and(|sub| {
        sub.is_active()
            && sub
                .current_period_end
                .map_or(true, |end| end > now)
    });

    let by_profile = snapshot.profile.as_ref().is_some_and(|profile| {
        profile.subscription_status == crate::models::subscription::SUBSCRIPTION_STATUS_ACTIVE
            && profile
                .subscription_expires_at
                .map_or(true, |end| end > now)
    });

    by_subscription || by_profile
}

/// Earliest strictly-future expiry instant across both sources, if any.
pub fn next_expiry(snapshot: &AccessSnapshot, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let sub_end = snapshot
        .subscription
        .as_ref()
        .and_then(|s| s.current_period_end);
    let profile_end = snapshot
        .profile
        .as_ref()
        .and_then(|p| p.subscription_expires_at);

    [sub_end, profile_end]
        .into_iter()
        .flatten()
        .filter(|end| *end > now)
        .min()
}

/// Cancellable task that publishes the current access flag over a watch
/// channel. Re-evaluates on the heartbeat, exactly at the next expiry, and
/// whenever `update` pushes a fresh snapshot. Dropping the monitor aborts
/// the task, so no interval or timer outlives it.
pub struct PremiumAccessMonitor {
    snapshot_tx: watch::Sender<AccessSnapshot>,
    access_rx: watch::Receiver<bool>,
    handle: JoinHandle<()>,
}

impl PremiumAccessMonitor {
    pub fn spawn(initial: AccessSnapshot) -> Self {
        let initial_access = has_premium_access(&initial, OffsetDateTime::now_utc());
        let (snapshot_tx, mut snapshot_rx) = watch::channel(initial);
        let (access_tx, access_rx) = watch::channel(initial_access);

        let handle = tokio::spawn(async move {
            loop {
                let now = OffsetDateTime::now_utc();
                let snapshot = snapshot_rx.borrow_and_update().clone();
                let access = has_premium_access(&snapshot, now);
                access_tx.send_if_modified(|current| {
                    if *current != access {
                        *current = access;
                        true
                    } else {
                        false
                    }
                });

                let sleep_for = match next_expiry(&snapshot, now) {
                    Some(expiry) => {
                        let millis = (expiry - now).whole_milliseconds();
                        if millis <= 0 {
                            Duration::ZERO
                        } else {
                            // +1ms so the wakeup lands strictly after the
                            // expiry instant.
                            Duration::from_millis(millis as u64 + 1).min(ACCESS_HEARTBEAT)
                        }
                    }
                    None => ACCESS_HEARTBEAT,
                };

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    changed = snapshot_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            snapshot_tx,
            access_rx,
            handle,
        }
    }

    /// Pushes fresh billing state, e.g. after the post-checkout refresh.
    pub fn update(&self, snapshot: AccessSnapshot) {
        let _ = self.snapshot_tx.send(snapshot);
    }

    pub fn has_access(&self) -> bool {
        *self.access_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.access_rx.clone()
    }
}

impl Drop for PremiumAccessMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::{
        SUBSCRIPTION_STATUS_ACTIVE, SUBSCRIPTION_STATUS_CANCELLED,
    };
    use uuid::Uuid;

    fn subscription(status: &str, period_end: Option<OffsetDateTime>) -> UserSubscription {
        let now = OffsetDateTime::now_utc();
        UserSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: status.into(),
            current_period_start: now,
            current_period_end: period_end,
            provider_customer_code: None,
            provider_subscription_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn profile(status: &str, expires_at: Option<OffsetDateTime>) -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            subscription_status: status.into(),
            subscription_plan_id: None,
            subscription_expires_at: expires_at,
            credits_balance: 0,
        }
    }

    #[test]
    fn access_flips_across_period_end() {
        let now = OffsetDateTime::now_utc();
        let end = now + time::Duration::seconds(1);
        let snapshot = AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_ACTIVE, Some(end))),
            profile: None,
        };

        assert!(has_premium_access(&snapshot, now));
        assert!(!has_premium_access(&snapshot, end));
        assert!(!has_premium_access(&snapshot, end + time::Duration::seconds(1)));
    }

    #[test]
    fn active_subscription_without_period_end_never_expires() {
        let snapshot = AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_ACTIVE, None)),
            profile: None,
        };
        assert!(has_premium_access(&snapshot, OffsetDateTime::now_utc()));
        assert!(next_expiry(&snapshot, OffsetDateTime::now_utc()).is_none());
    }

    #[test]
    fn stale_profile_mirror_still_grants_access() {
        let now = OffsetDateTime::now_utc();
        let snapshot = AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_CANCELLED, None)),
            profile: Some(profile(
                SUBSCRIPTION_STATUS_ACTIVE,
                Some(now + time::Duration::hours(1)),
            )),
        };
        assert!(has_premium_access(&snapshot, now));
    }

    #[test]
    fn next_expiry_picks_earliest_future_instant() {
        let now = OffsetDateTime::now_utc();
        let sooner = now + time::Duration::minutes(5);
        let later = now + time::Duration::hours(1);
        let snapshot = AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_ACTIVE, Some(later))),
            profile: Some(profile(SUBSCRIPTION_STATUS_ACTIVE, Some(sooner))),
        };
        assert_eq!(next_expiry(&snapshot, now), Some(sooner));

        // Past instants are not candidates.
        let stale = AccessSnapshot {
            subscription: Some(subscription(
                SUBSCRIPTION_STATUS_ACTIVE,
                Some(now - time::Duration::minutes(5)),
            )),
            profile: None,
        };
        assert_eq!(next_expiry(&stale, now), None);
    }

    #[tokio::test]
    async fn monitor_revokes_access_at_expiry_without_refresh() {
        let end = OffsetDateTime::now_utc() + time::Duration::milliseconds(300);
        let monitor = PremiumAccessMonitor::spawn(AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_ACTIVE, Some(end))),
            profile: None,
        });
        assert!(monitor.has_access());

        let mut rx = monitor.subscribe();
        if *rx.borrow() {
            tokio::time::timeout(Duration::from_secs(5), rx.changed())
                .await
                .expect("access should flip before the heartbeat")
                .expect("monitor should stay alive");
        }
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn monitor_picks_up_pushed_snapshots() {
        let monitor = PremiumAccessMonitor::spawn(AccessSnapshot::default());
        assert!(!monitor.has_access());

        let mut rx = monitor.subscribe();
        monitor.update(AccessSnapshot {
            subscription: Some(subscription(SUBSCRIPTION_STATUS_ACTIVE, None)),
            profile: None,
        });

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("pushed snapshot should re-evaluate promptly")
            .expect("monitor should stay alive");
        assert!(*rx.borrow());
    }
}
