//! Stable numeric identifiers for every entity kind the world-state server
//! tracks, plus the 64-bit UTC timestamp used throughout.
//!
//! Every id type reserves the maximum representable value as an "invalid"
//! sentinel, mirroring the convention used for e.g. `UserID` and `ParcelID`
//! in the original implementation.

use serde::{Deserialize, Serialize};

macro_rules! make_id {
    {$(
        $(#[$meta:meta])*
        $vis:vis struct $ident:ident($int:ty);
    )*} => {$(
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash,
            Serialize, Deserialize,
        )]
        $vis struct $ident(pub $int);

        impl $ident {
            /// The reserved sentinel meaning "no such entity" / "not logged in".
            pub const INVALID: Self = Self(<$int>::MAX);

            pub const fn is_valid(self) -> bool {
                self.0 != <$int>::MAX
            }

            pub const fn value(self) -> $int {
                self.0
            }
        }

        impl Default for $ident {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl std::fmt::Display for $ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    )*}
}

make_id! {
	/// Identifies a user account. 32-bit, per spec.
	///
	/// `UserId(0)` is reserved for the server's "god user": the one account
	/// with full administrative control, matching `UserID.h`'s `isGodUser`.
	pub struct UserId(u32);

	/// Identifies a parcel of land within a world. 32-bit, per spec.
	pub struct ParcelId(u32);

	/// Identifies a [`crate::model::world_object::WorldObject`] within a single world.
	/// Stable for the object's lifetime.
	pub struct WorldObjectUid(u64);

	/// Identifies a server-owned chat-bot avatar within a world.
	pub struct ChatBotId(u64);

	/// Identifies a connected client's avatar within a world. Assigned on
	/// connect, never reused while the server is running.
	pub struct ClientAvatarId(u64);

	/// Identifies an auction of a parcel.
	pub struct AuctionId(u64);

	/// Identifies a purchase order.
	pub struct OrderId(u64);

	/// Identifies a news post.
	pub struct NewsPostId(u64);

	/// Identifies a scheduled event ("SubEvent").
	pub struct SubEventId(u64);

	/// Identifies a photo uploaded by a user.
	pub struct PhotoId(u64);

	/// Identifies a screenshot taken by the screenshot bot.
	pub struct ScreenshotId(u64);
}

impl UserId {
	/// Is this the server's one administrative account, matching
	/// `UserID.h`'s `isGodUser`.
	pub const fn is_god_user(self) -> bool {
		self.0 == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_sentinel_is_max_value() {
		assert_eq!(UserId::INVALID.value(), u32::MAX);
		assert_eq!(WorldObjectUid::INVALID.value(), u64::MAX);
		assert!(!UserId::INVALID.is_valid());
		assert!(UserId(0).is_valid());
	}

	#[test]
	fn default_is_invalid() {
		assert_eq!(UserId::default(), UserId::INVALID);
	}

	#[test]
	fn only_user_zero_is_god_user() {
		assert!(UserId(0).is_god_user());
		assert!(!UserId(1).is_god_user());
		assert!(!UserId::INVALID.is_god_user());
	}
}
