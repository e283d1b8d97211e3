use chrono::{DateTime, Utc};
use marquee_core::{Clock, CoreResult, ReservationError};
use marquee_shared::{HolderId, Lease, Seat, SeatKey, SeatSnapshot, SeatStatus, SeatStatusReport, Showtime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// State of a single seat. An expired lease may linger here until the next
/// access or sweep; it is never honored.
#[derive(Debug, Default)]
pub(crate) struct SeatCell {
    pub(crate) booked: bool,
    pub(crate) lease: Option<Lease>,
}

/// Index-addressed seat table for one showtime. Each seat has its own mutex,
/// so operations on different seats never contend.
pub(crate) struct SeatTable {
    pub(crate) showtime: Showtime,
    cells: Vec<Mutex<SeatCell>>,
}

impl SeatTable {
    fn new(showtime: Showtime) -> Self {
        let cells = (0..showtime.capacity()).map(|_| Mutex::new(SeatCell::default())).collect();
        Self { showtime, cells }
    }

    pub(crate) fn index(&self, key: &SeatKey) -> CoreResult<usize> {
        self.showtime.seat_index(key).ok_or_else(|| {
            ReservationError::InvalidSeat(format!("{} is not part of showtime {}", key, self.showtime.id))
        })
    }

    pub(crate) fn lock_seat(&self, key: &SeatKey) -> CoreResult<MutexGuard<'_, SeatCell>> {
        let index = self.index(key)?;
        Ok(self.lock_index(index))
    }

    pub(crate) fn lock_index(&self, index: usize) -> MutexGuard<'_, SeatCell> {
        self.cells[index].lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = (usize, &Mutex<SeatCell>)> {
        self.cells.iter().enumerate()
    }
}

/// Authoritative per-showtime seat map. Owns the terminal `booked` transition;
/// leases are granted through [`crate::LockCoordinator`].
pub struct SeatInventory {
    tables: RwLock<HashMap<Uuid, Arc<SeatTable>>>,
    clock: Arc<dyn Clock>,
}

impl SeatInventory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Install an all-available seat table for a showtime
    pub fn register(&self, showtime: Showtime) -> CoreResult<()> {
        showtime.validate().map_err(ReservationError::Validation)?;

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.contains_key(&showtime.id) {
            return Err(ReservationError::Validation(format!(
                "Showtime {} is already registered",
                showtime.id
            )));
        }

        info!(
            "Registered showtime {} ({} rows x {} seats)",
            showtime.id, showtime.rows, showtime.seats_per_row
        );
        tables.insert(showtime.id, Arc::new(SeatTable::new(showtime)));
        Ok(())
    }

    pub fn showtime(&self, showtime_id: Uuid) -> Option<Showtime> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&showtime_id)
            .map(|table| table.showtime.clone())
    }

    pub(crate) fn table(&self, showtime_id: Uuid) -> CoreResult<Arc<SeatTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&showtime_id)
            .cloned()
            .ok_or(ReservationError::ShowtimeUnavailable(showtime_id))
    }

    pub(crate) fn tables(&self) -> Vec<Arc<SeatTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Booked seats plus seats held under an unexpired lease.
    ///
    /// Seats are read one at a time, so the lock view may be transiently
    /// stale; booked seats never revert, so that part is always accurate.
    pub fn seat_status(&self, showtime_id: Uuid) -> CoreResult<SeatStatusReport> {
        let table = self.table(showtime_id)?;
        let now = self.clock.now();
        let mut report = SeatStatusReport::default();

        for (index, cell) in table.cells() {
            let cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(key) = table.showtime.seat_at(index) else {
                continue;
            };
            if cell.booked {
                report.booked_seats.push(key);
            } else if cell.lease.as_ref().is_some_and(|lease| lease.is_active(now)) {
                report.locked_seats.push(key);
            }
        }

        Ok(report)
    }

    pub fn snapshot(&self, showtime_id: Uuid) -> CoreResult<SeatSnapshot> {
        let table = self.table(showtime_id)?;
        let report = self.seat_status(showtime_id)?;
        Ok(merge_snapshot(&table.showtime, &report, self.clock.now()))
    }

    /// Turn `holder`'s leased seats into booked seats.
    ///
    /// All or nothing: if any seat is not under an active lease of `holder`
    /// the call fails with `SeatNoLongerAvailable` and no seat changes.
    pub fn confirm_booking(
        &self,
        showtime_id: Uuid,
        seats: &[SeatKey],
        holder: &HolderId,
    ) -> CoreResult<Vec<SeatKey>> {
        if seats.is_empty() {
            return Err(ReservationError::EmptySelection);
        }
        let table = self.table(showtime_id)?;

        let mut indexed = seats
            .iter()
            .map(|key| table.index(key).map(|index| (index, *key)))
            .collect::<CoreResult<Vec<_>>>()?;
        indexed.sort_by_key(|(index, _)| *index);
        indexed.dedup_by_key(|(index, _)| *index);

        // Ascending index order keeps concurrent multi-seat confirms deadlock free
        let mut guards: Vec<_> = indexed.iter().map(|(index, _)| table.lock_index(*index)).collect();
        let now = self.clock.now();

        for ((_, key), cell) in indexed.iter().zip(guards.iter()) {
            let held = !cell.booked && cell.lease.as_ref().is_some_and(|lease| lease.is_held_by(holder, now));
            if !held {
                warn!("Booking rejected for {} on showtime {}: {} not held", holder, showtime_id, key);
                return Err(ReservationError::SeatNoLongerAvailable(*key));
            }
        }

        for cell in guards.iter_mut() {
            cell.booked = true;
            cell.lease = None;
        }

        let booked: Vec<SeatKey> = indexed.into_iter().map(|(_, key)| key).collect();
        info!("Booked {} seat(s) on showtime {} for {}", booked.len(), showtime_id, holder);
        Ok(booked)
    }
}

/// Merge the grid with booked and locked markers. Booked takes precedence if a
/// seat carries both; keys outside the grid are ignored.
pub fn merge_snapshot(showtime: &Showtime, report: &SeatStatusReport, taken_at: DateTime<Utc>) -> SeatSnapshot {
    let mut statuses = vec![SeatStatus::Available; showtime.capacity()];

    for key in &report.locked_seats {
        if let Some(index) = showtime.seat_index(key) {
            statuses[index] = SeatStatus::Locked;
        }
    }
    for key in &report.booked_seats {
        if let Some(index) = showtime.seat_index(key) {
            statuses[index] = SeatStatus::Booked;
        }
    }

    let seats: Vec<Seat> = statuses
        .into_iter()
        .enumerate()
        .filter_map(|(index, status)| showtime.seat_at(index).map(|key| Seat { key, status }))
        .collect();

    SeatSnapshot {
        showtime_id: showtime.id,
        taken_at,
        rows: seats
            .chunks((showtime.seats_per_row as usize).max(1))
            .map(<[Seat]>::to_vec)
            .collect(),
    }
}
