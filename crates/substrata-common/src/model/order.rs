//! A purchase order for a parcel. Grounded in
//! `server/Order.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{
	ids::{OrderId, ParcelId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: OrderId,
	pub user_id: UserId,
	pub parcel_id: ParcelId,
	pub created_time: Timestamp,

	pub payer_email: String,
	pub gross_payment: f64,
	pub currency: String,

	pub paypal_data: String,
	pub coinbase_charge_code: String,
	pub coinbase_status: String,

	pub confirmed: bool,
}

const ORDER_VERSION: u32 = 1;

impl StoreEntity for Order {
	const KIND: u32 = crate::store::RecordKind::Order as u32;
	const VERSION: u32 = ORDER_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		w.write_u32(self.user_id.value());
		w.write_u32(self.parcel_id.value());
		w.write_u64(self.created_time.0);
		w.write_string(&self.payer_email);
		w.write_f64(self.gross_payment);
		w.write_string(&self.currency);
		w.write_string(&self.paypal_data);
		w.write_string(&self.coinbase_charge_code);
		w.write_string(&self.coinbase_status);
		w.write_bool(self.confirmed);
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, ORDER_VERSION, r)?;
		Ok(Order {
			db_key: None,
			id: OrderId(r.read_u64()?),
			user_id: UserId(r.read_u32()?),
			parcel_id: ParcelId(r.read_u32()?),
			created_time: Timestamp(r.read_u64()?),
			payer_email: r.read_string()?,
			gross_payment: r.read_f64()?,
			currency: r.read_string()?,
			paypal_data: r.read_string()?,
			coinbase_charge_code: r.read_string()?,
			coinbase_status: r.read_string()?,
			confirmed: r.read_bool()?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn store_round_trip() {
		let o = Order {
			db_key: None,
			id: OrderId(1),
			user_id: UserId(2),
			parcel_id: ParcelId(3),
			created_time: Timestamp(100),
			payer_email: "buyer@example.com".into(),
			gross_payment: 42.5,
			currency: "USD".into(),
			paypal_data: "{}".into(),
			coinbase_charge_code: String::new(),
			coinbase_status: String::new(),
			confirmed: true,
		};
		let bytes = Writer::write_versioned_payload(Order::VERSION, |w| o.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let o2 = Order::read_fields(version, &mut fields).unwrap();
		assert_eq!(o.id, o2.id);
		assert_eq!(o.gross_payment, o2.gross_payment);
		assert_eq!(o.confirmed, o2.confirmed);
	}
}
