use async_trait::async_trait;
use chrono::{DateTime, Duration};
use marquee_core::{Clock, CoreResult, ReleaseOutcome, ReservationBackend, ReservationError, SeatLockService};
use marquee_shared::{HolderId, Lease, SeatKey, SeatStatusReport, Showtime};
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// Every key of a showtime carries the same `{showtime}` hash tag so the
// multi-key scripts stay on one cluster slot.

/// KEYS: lock, booked set, lock index. ARGV: seat label, holder, now (ms),
/// ttl (ms). Returns the lease's acquisition time in ms, or -1 if the seat is
/// taken.
const ACQUIRE_LUA: &str = r#"
if redis.call("SISMEMBER", KEYS[2], ARGV[1]) == 1 then
    return -1
end
local holder = redis.call("HGET", KEYS[1], "holder")
if holder and holder ~= ARGV[2] then
    return -1
end
if not holder then
    redis.call("HSET", KEYS[1], "holder", ARGV[2], "acquired_at", ARGV[3])
end
redis.call("PEXPIRE", KEYS[1], ARGV[4])
redis.call("SADD", KEYS[3], ARGV[1])
return tonumber(redis.call("HGET", KEYS[1], "acquired_at"))
"#;

/// KEYS: lock, lock index. ARGV: holder, seat label. Returns 1 when released.
const RELEASE_LUA: &str = r#"
if redis.call("HGET", KEYS[1], "holder") == ARGV[1] then
    redis.call("DEL", KEYS[1])
    redis.call("SREM", KEYS[2], ARGV[2])
    return 1
end
return 0
"#;

/// KEYS: booked set, lock index, lock keys... ARGV: holder, seat labels... (in
/// lock key order). Returns 0 on success, otherwise the 1-based position of
/// the first seat that is not held by the caller. Nothing is written on
/// failure.
const CONFIRM_LUA: &str = r#"
for i = 3, #KEYS do
    if redis.call("SISMEMBER", KEYS[1], ARGV[i - 1]) == 1
        or redis.call("HGET", KEYS[i], "holder") ~= ARGV[1] then
        return i - 2
    end
end
for i = 3, #KEYS do
    redis.call("SADD", KEYS[1], ARGV[i - 1])
    redis.call("SREM", KEYS[2], ARGV[i - 1])
    redis.call("DEL", KEYS[i])
end
return 0
"#;

/// KEYS: lock index, lock keys... ARGV: seat labels... (in lock key order).
/// Drops index entries whose lock key expired and returns the live labels.
const LIVE_LOCKS_LUA: &str = r#"
local live = {}
for i = 2, #KEYS do
    if redis.call("EXISTS", KEYS[i]) == 1 then
        table.insert(live, ARGV[i - 1])
    else
        redis.call("SREM", KEYS[1], ARGV[i - 1])
    end
end
return live
"#;

fn showtime_key(showtime_id: Uuid) -> String {
    format!("marquee:{{{}}}:showtime", showtime_id)
}

fn booked_key(showtime_id: Uuid) -> String {
    format!("marquee:{{{}}}:booked", showtime_id)
}

/// Labels of seats that may hold a lock key. Entries outlive expired locks
/// until the next status read prunes them.
fn lock_index_key(showtime_id: Uuid) -> String {
    format!("marquee:{{{}}}:locks", showtime_id)
}

fn lock_key(showtime_id: Uuid, seat: &SeatKey) -> String {
    format!("marquee:{{{}}}:lock:{}", showtime_id, seat)
}

fn backend_err(e: redis::RedisError) -> ReservationError {
    warn!("Redis error: {}", e);
    ReservationError::Backend(e.to_string())
}

/// Seat reservation protocol on Redis, for API instances that share leases.
///
/// Each operation is a single Lua script, which gives the same per-seat
/// atomicity as the in-process coordinator. Lease expiry is Redis key expiry.
#[derive(Clone)]
pub struct RedisSeatStore {
    client: redis::Client,
    clock: Arc<dyn Clock>,
}

impl RedisSeatStore {
    /// Lease timestamps come from `clock`; actual expiry is Redis key expiry.
    pub async fn new(connection_string: &str, clock: Arc<dyn Clock>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, clock })
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(backend_err)
    }

    /// Store showtime metadata unless the showtime already exists.
    pub async fn register_showtime(&self, showtime: &Showtime) -> CoreResult<bool> {
        showtime.validate().map_err(ReservationError::Validation)?;
        let payload = serde_json::to_string(showtime).map_err(|e| ReservationError::Validation(e.to_string()))?;

        let mut conn = self.connection().await?;
        let created: bool = conn
            .set_nx(showtime_key(showtime.id), payload)
            .await
            .map_err(backend_err)?;
        if created {
            info!("Showtime {} registered in Redis", showtime.id);
        }
        Ok(created)
    }

    async fn require_showtime(&self, showtime_id: Uuid) -> CoreResult<Showtime> {
        self.showtime(showtime_id)
            .await?
            .ok_or(ReservationError::ShowtimeUnavailable(showtime_id))
    }

    fn check_in_grid(showtime: &Showtime, seat: &SeatKey) -> CoreResult<()> {
        match showtime.seat_index(seat) {
            Some(_) => Ok(()),
            None => Err(ReservationError::InvalidSeat(format!(
                "{} is not part of showtime {}",
                seat, showtime.id
            ))),
        }
    }
}

#[async_trait]
impl SeatLockService for RedisSeatStore {
    async fn acquire(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId, ttl: Duration) -> CoreResult<Lease> {
        if ttl <= Duration::zero() {
            return Err(ReservationError::Validation("Lease TTL must be positive".to_string()));
        }
        let showtime = self.require_showtime(showtime_id).await?;
        Self::check_in_grid(&showtime, &seat)?;

        let now = self.clock.now();
        let mut conn = self.connection().await?;
        let acquired_ms: i64 = redis::Script::new(ACQUIRE_LUA)
            .key(lock_key(showtime_id, &seat))
            .key(booked_key(showtime_id))
            .key(lock_index_key(showtime_id))
            .arg(seat.to_string())
            .arg(holder.as_str())
            .arg(now.timestamp_millis())
            .arg(ttl.num_milliseconds())
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;

        if acquired_ms < 0 {
            warn!("Seat {} on showtime {} already held, rejecting {}", seat, showtime_id, holder);
            return Err(ReservationError::SeatUnavailable(seat));
        }

        Ok(Lease {
            showtime_id,
            seat,
            holder: holder.clone(),
            acquired_at: DateTime::from_timestamp_millis(acquired_ms).unwrap_or(now),
            expires_at: now + ttl,
        })
    }

    async fn release(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId) -> CoreResult<ReleaseOutcome> {
        let mut conn = self.connection().await?;
        let released: i64 = redis::Script::new(RELEASE_LUA)
            .key(lock_key(showtime_id, &seat))
            .key(lock_index_key(showtime_id))
            .arg(holder.as_str())
            .arg(seat.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;

        Ok(if released == 1 {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::NotHolder
        })
    }

    async fn lease(&self, showtime_id: Uuid, seat: SeatKey) -> CoreResult<Option<Lease>> {
        let mut conn = self.connection().await?;
        let (holder, acquired_ms, remaining_ms): (Option<String>, Option<i64>, i64) = redis::pipe()
            .hget(lock_key(showtime_id, &seat), "holder")
            .hget(lock_key(showtime_id, &seat), "acquired_at")
            .pttl(lock_key(showtime_id, &seat))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        // PTTL is negative once the key is gone
        let Some(holder) = holder.filter(|_| remaining_ms > 0) else {
            return Ok(None);
        };
        let now = self.clock.now();
        Ok(Some(Lease {
            showtime_id,
            seat,
            holder: HolderId::new(holder),
            acquired_at: acquired_ms.and_then(DateTime::from_timestamp_millis).unwrap_or(now),
            expires_at: now + Duration::milliseconds(remaining_ms),
        }))
    }
}

#[async_trait]
impl ReservationBackend for RedisSeatStore {
    async fn showtime(&self, showtime_id: Uuid) -> CoreResult<Option<Showtime>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(showtime_key(showtime_id)).await.map_err(backend_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(|e| ReservationError::Backend(e.to_string())))
            .transpose()
    }

    async fn seat_status(&self, showtime_id: Uuid) -> CoreResult<SeatStatusReport> {
        self.require_showtime(showtime_id).await?;
        let mut conn = self.connection().await?;

        let (booked, indexed): (Vec<String>, Vec<String>) = redis::pipe()
            .smembers(booked_key(showtime_id))
            .smembers(lock_index_key(showtime_id))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        let candidates: Vec<SeatKey> = indexed.iter().filter_map(|label| label.parse().ok()).collect();
        let mut locked: Vec<SeatKey> = if candidates.is_empty() {
            Vec::new()
        } else {
            let script = redis::Script::new(LIVE_LOCKS_LUA);
            let mut invocation = script.prepare_invoke();
            invocation.key(lock_index_key(showtime_id));
            for seat in &candidates {
                invocation.key(lock_key(showtime_id, seat));
                invocation.arg(seat.to_string());
            }
            let live: Vec<String> = invocation.invoke_async(&mut conn).await.map_err(backend_err)?;
            live.iter().filter_map(|label| label.parse().ok()).collect()
        };

        let mut booked: Vec<SeatKey> = booked.iter().filter_map(|label| label.parse().ok()).collect();
        booked.sort();
        locked.sort();
        Ok(SeatStatusReport {
            booked_seats: booked,
            locked_seats: locked,
        })
    }

    async fn confirm_booking(&self, showtime_id: Uuid, seats: &[SeatKey], holder: &HolderId) -> CoreResult<Vec<SeatKey>> {
        if seats.is_empty() {
            return Err(ReservationError::EmptySelection);
        }
        let showtime = self.require_showtime(showtime_id).await?;
        let mut seats = seats.to_vec();
        seats.sort();
        seats.dedup();
        for seat in &seats {
            Self::check_in_grid(&showtime, seat)?;
        }

        let script = redis::Script::new(CONFIRM_LUA);
        let mut invocation = script.prepare_invoke();
        invocation.key(booked_key(showtime_id));
        invocation.key(lock_index_key(showtime_id));
        invocation.arg(holder.as_str());
        for seat in &seats {
            invocation.key(lock_key(showtime_id, seat));
            invocation.arg(seat.to_string());
        }

        let mut conn = self.connection().await?;
        let failed_at: usize = invocation.invoke_async(&mut conn).await.map_err(backend_err)?;

        if let Some(&seat) = failed_at.checked_sub(1).and_then(|i| seats.get(i)) {
            warn!("Booking rejected for {} on showtime {}: {} not held", holder, showtime_id, seat);
            return Err(ReservationError::SeatNoLongerAvailable(seat));
        }

        info!("Booked {} seat(s) on showtime {} for {}", seats.len(), showtime_id, holder);
        Ok(seats)
    }

    async fn sweep_expired(&self) -> CoreResult<Vec<Lease>> {
        // Redis drops expired lock keys itself
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marquee_core::{ManualClock, SystemClock};
    use tokio::task::JoinSet;

    fn key(label: &str) -> SeatKey {
        label.parse().unwrap()
    }

    #[test]
    fn test_keys_share_showtime_hash_tag() {
        let id = Uuid::new_v4();
        let tag = format!("{{{}}}", id);

        assert_eq!(lock_key(id, &key("B5")), format!("marquee:{}:lock:B5", tag));
        assert!(booked_key(id).contains(&tag));
        assert!(showtime_key(id).contains(&tag));
        assert!(lock_index_key(id).contains(&tag));
    }

    // The tests below talk to a real server: `REDIS_URL=... cargo test -- --ignored`

    async fn store_with_showtime() -> (RedisSeatStore, Showtime) {
        store_with_clock(Arc::new(SystemClock)).await
    }

    async fn store_with_clock(clock: Arc<dyn Clock>) -> (RedisSeatStore, Showtime) {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisSeatStore::new(&url, clock).await.unwrap();
        let start = Utc::now() + Duration::days(1);
        let show = Showtime {
            id: Uuid::new_v4(),
            theater: "Roxy".to_string(),
            screen: "4".to_string(),
            movie: "Stalker".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(161),
            price_cents: 800,
            rows: 3,
            seats_per_row: 5,
        };
        assert!(store.register_showtime(&show).await.unwrap());
        assert!(!store.register_showtime(&show).await.unwrap());
        (store, show)
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_one_winner_per_seat() {
        let (store, show) = store_with_showtime().await;

        let mut tasks = JoinSet::new();
        for n in 0..16 {
            let store = store.clone();
            let showtime_id = show.id;
            tasks.spawn(async move {
                let holder = HolderId::new(format!("guest-{}", n));
                store.acquire(showtime_id, key("B3"), &holder, Duration::seconds(30)).await
            });
        }

        let mut winners = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert_eq!(err, ReservationError::SeatUnavailable(key("B3"))),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.seat_status(show.id).await.unwrap().locked_seats, vec![key("B3")]);
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_release_by_other_holder_is_a_no_op() {
        let (store, show) = store_with_showtime().await;
        let alice = HolderId::from("alice");
        let bob = HolderId::from("bob");

        let lease = store.acquire(show.id, key("A1"), &alice, Duration::seconds(30)).await.unwrap();
        let refreshed = store.acquire(show.id, key("A1"), &alice, Duration::seconds(30)).await.unwrap();
        assert_eq!(refreshed.acquired_at, lease.acquired_at);

        assert_eq!(store.release(show.id, key("A1"), &bob).await.unwrap(), ReleaseOutcome::NotHolder);
        assert_eq!(store.lease(show.id, key("A1")).await.unwrap().unwrap().holder, alice);

        assert_eq!(store.release(show.id, key("A1"), &alice).await.unwrap(), ReleaseOutcome::Released);
        assert_eq!(store.release(show.id, key("A1"), &alice).await.unwrap(), ReleaseOutcome::NotHolder);
        assert!(store.lease(show.id, key("A1")).await.unwrap().is_none());
        assert!(store.seat_status(show.id).await.unwrap().locked_seats.is_empty());
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_confirm_is_all_or_nothing() {
        let (store, show) = store_with_showtime().await;
        let alice = HolderId::from("alice");
        let bob = HolderId::from("bob");
        let ttl = Duration::seconds(30);

        store.acquire(show.id, key("C1"), &alice, ttl).await.unwrap();
        store.acquire(show.id, key("C2"), &alice, ttl).await.unwrap();
        store.acquire(show.id, key("C3"), &bob, ttl).await.unwrap();

        let err = store
            .confirm_booking(show.id, &[key("C3"), key("C1"), key("C2")], &alice)
            .await
            .unwrap_err();
        assert_eq!(err, ReservationError::SeatNoLongerAvailable(key("C3")));
        let report = store.seat_status(show.id).await.unwrap();
        assert!(report.booked_seats.is_empty());
        assert_eq!(report.locked_seats, vec![key("C1"), key("C2"), key("C3")]);

        let booked = store.confirm_booking(show.id, &[key("C2"), key("C1")], &alice).await.unwrap();
        assert_eq!(booked, vec![key("C1"), key("C2")]);
        let report = store.seat_status(show.id).await.unwrap();
        assert_eq!(report.booked_seats, vec![key("C1"), key("C2")]);
        assert_eq!(report.locked_seats, vec![key("C3")]);

        assert_eq!(
            store.acquire(show.id, key("C1"), &bob, ttl).await.unwrap_err(),
            ReservationError::SeatUnavailable(key("C1"))
        );
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_lapsed_lock_frees_seat() {
        let (store, show) = store_with_showtime().await;

        store
            .acquire(show.id, key("A5"), &"alice".into(), Duration::milliseconds(200))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        assert!(store.lease(show.id, key("A5")).await.unwrap().is_none());
        assert!(store.seat_status(show.id).await.unwrap().locked_seats.is_empty());
        assert!(store
            .acquire(show.id, key("A5"), &"bob".into(), Duration::seconds(30))
            .await
            .is_ok());
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_lease_times_follow_injected_clock() {
        let clock = Arc::new(ManualClock::default());
        let (store, show) = store_with_clock(clock.clone()).await;
        clock.advance(Duration::hours(3));
        let now = clock.now();

        let lease = store
            .acquire(show.id, key("B1"), &"alice".into(), Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(lease.acquired_at.timestamp_millis(), now.timestamp_millis());
        assert_eq!(lease.expires_at, now + Duration::seconds(30));
    }
}
