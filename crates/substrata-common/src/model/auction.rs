//! Parcel auctions. Grounded in
//! `server/ParcelAuction.{h,cpp}` and `server/AuctionLock.h`.

use serde::{Deserialize, Serialize};

use crate::{
	ids::{AuctionId, OrderId, ParcelId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AuctionState {
	ForSale,
	Sold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuctionLock {
	pub user_id: UserId,
	pub locked_time: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: AuctionId,
	pub parcel_id: ParcelId,

	pub state: AuctionState,
	pub start_time: Timestamp,
	pub end_time: Timestamp,
	pub start_price: f64,
	pub end_price: f64,

	/// Set once `state == Sold`.
	pub sold_price: f64,
	pub auction_sold_time: Timestamp,
	pub order_id: OrderId,

	pub last_locked_time: Timestamp,
	pub lock_duration_secs: u64,

	/// At most 1000 entries.
	pub screenshot_ids: Vec<u64>,
	pub auction_locks: Vec<AuctionLock>,
}

pub const MAX_SCREENSHOT_IDS: usize = 1000;

impl Auction {
	pub fn new(id: AuctionId, parcel_id: ParcelId, start_time: Timestamp, end_time: Timestamp, start_price: f64, end_price: f64) -> Self {
		Self {
			db_key: None,
			id,
			parcel_id,
			state: AuctionState::ForSale,
			start_time,
			end_time,
			start_price,
			end_price,
			sold_price: 0.0,
			auction_sold_time: Timestamp(0),
			order_id: OrderId::INVALID,
			last_locked_time: Timestamp(0),
			lock_duration_secs: 0,
			screenshot_ids: Vec::new(),
			auction_locks: Vec::new(),
		}
	}

	/// `currentlyForSale(now) = state=ForSale && now <= auction_end_time`.
	pub fn currently_for_sale(&self, now: Timestamp) -> bool {
		self.state == AuctionState::ForSale && now.0 <= self.end_time.0
	}

	/// Linear interpolation between `start_price` and `end_price`, truncated
	/// (not rounded) to 2 decimal places — matches
	/// `ParcelAuction::computeCurrentAuctionPrice`'s `(int)(x*100)/100.0`.
	pub fn price_at(&self, t: Timestamp) -> f64 {
		let span = (self.end_time.0 as f64) - (self.start_time.0 as f64);
		let frac = ((t.0 as f64) - (self.start_time.0 as f64)) / span;
		let exact = self.start_price + (self.end_price - self.start_price) * frac;
		((exact * 100.0) as i64) as f64 / 100.0
	}

	pub fn is_locked(&self, now: Timestamp) -> bool {
		now.0 < self.lock_expiry_time().0
	}

	pub fn lock_expiry_time(&self) -> Timestamp {
		Timestamp(self.last_locked_time.0 + self.lock_duration_secs)
	}

	/// Returns `false` (refusing the lock) if already locked by a bid in
	/// progress, or at capacity on history; otherwise records the lock.
	pub fn try_lock(&mut self, user_id: UserId, now: Timestamp, lock_duration_secs: u64) -> bool {
		if self.is_locked(now) {
			return false;
		}
		self.last_locked_time = now;
		self.lock_duration_secs = lock_duration_secs;
		self.auction_locks.push(AuctionLock {
			user_id,
			locked_time: now,
		});
		true
	}

	pub fn mark_sold(&mut self, sold_price: f64, sold_time: Timestamp, order_id: OrderId) {
		self.state = AuctionState::Sold;
		self.sold_price = sold_price;
		self.auction_sold_time = sold_time;
		self.order_id = order_id;
	}

	pub fn add_screenshot(&mut self, screenshot_id: u64) -> bool {
		if self.screenshot_ids.len() >= MAX_SCREENSHOT_IDS {
			return false;
		}
		self.screenshot_ids.push(screenshot_id);
		true
	}

	/// The time the auction ended, or if it was sold, when it was sold.
	pub fn auction_end_or_sold_time(&self) -> Timestamp {
		match self.state {
			AuctionState::Sold => self.auction_sold_time,
			AuctionState::ForSale => self.end_time,
		}
	}
}

const AUCTION_VERSION: u32 = 4;

impl StoreEntity for Auction {
	const KIND: u32 = crate::store::RecordKind::Auction as u32;
	const VERSION: u32 = AUCTION_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		w.write_u32(self.parcel_id.value());
		w.write_u8(match self.state {
			AuctionState::ForSale => 0,
			AuctionState::Sold => 1,
		});
		w.write_u64(self.start_time.0);
		w.write_u64(self.end_time.0);
		w.write_f64(self.start_price);
		w.write_f64(self.end_price);
		w.write_f64(self.sold_price);
		w.write_u64(self.auction_sold_time.0);
		w.write_u64(self.order_id.value());
		w.write_u64(self.last_locked_time.0);
		w.write_u64(self.lock_duration_secs);

		w.write_u32(self.screenshot_ids.len() as u32);
		for id in &self.screenshot_ids {
			w.write_u64(*id);
		}
		w.write_u32(self.auction_locks.len() as u32);
		for lock in &self.auction_locks {
			w.write_u32(lock.user_id.value());
			w.write_u64(lock.locked_time.0);
		}
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, AUCTION_VERSION, r)?;

		let id = AuctionId(r.read_u64()?);
		let parcel_id = ParcelId(r.read_u32()?);
		let state = match r.read_u8()? {
			0 => AuctionState::ForSale,
			_ => AuctionState::Sold,
		};
		let start_time = Timestamp(r.read_u64()?);
		let end_time = Timestamp(r.read_u64()?);
		let start_price = r.read_f64()?;
		let end_price = r.read_f64()?;
		let sold_price = r.read_f64()?;
		let auction_sold_time = Timestamp(r.read_u64()?);
		let order_id = OrderId(r.read_u64()?);
		let last_locked_time = Timestamp(r.read_u64()?);
		let lock_duration_secs = r.read_u64()?;

		let n_screenshots = r.read_u32()?;
		let screenshot_ids = (0..n_screenshots)
			.map(|_| r.read_u64())
			.collect::<Result<_, crate::error::StoreError>>()?;
		let n_locks = r.read_u32()?;
		let mut auction_locks = Vec::with_capacity(n_locks as usize);
		for _ in 0..n_locks {
			auction_locks.push(AuctionLock {
				user_id: UserId(r.read_u32()?),
				locked_time: Timestamp(r.read_u64()?),
			});
		}

		Ok(Auction {
			db_key: None,
			id,
			parcel_id,
			state,
			start_time,
			end_time,
			start_price,
			end_price,
			sold_price,
			auction_sold_time,
			order_id,
			last_locked_time,
			lock_duration_secs,
			screenshot_ids,
			auction_locks,
		})
	}
}
