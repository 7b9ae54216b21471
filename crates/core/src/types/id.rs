//! Opaque string UIDs for type-safe entity references.
//!
//! Use the `define_uid!` macro to create type-safe UID wrappers that prevent
//! accidentally mixing UIDs from different entity types. Every UID is a fixed
//! length random alphanumeric string; uniqueness is enforced by the store, not
//! by the generator.

use rand::{Rng, distr::Alphanumeric};

/// Length of every generated UID.
pub const UID_LENGTH: usize = 50;

/// Generate a random alphanumeric string of [`UID_LENGTH`] characters.
#[must_use]
pub fn random_uid() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(UID_LENGTH)
        .map(char::from)
        .collect()
}

/// Macro to define a type-safe UID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `generate()`, `as_str()`, `into_inner()`
/// - `From<String>` and `Into<String>` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use bestby_core::define_uid;
/// define_uid!(ShelfUid);
/// define_uid!(FridgeUid);
///
/// let shelf = ShelfUid::new("abc");
/// let fridge = FridgeUid::new("abc");
///
/// // These are different types, so this won't compile:
/// // let _: ShelfUid = fridge;
/// # let _ = (shelf, fridge);
/// ```
#[macro_export]
macro_rules! define_uid {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing UID string.
            #[must_use]
            pub fn new(uid: impl Into<String>) -> Self {
                Self(uid.into())
            }

            /// Generate a fresh random candidate UID.
            ///
            /// The candidate is not guaranteed unique; callers insert it with
            /// an insert-if-absent primitive and retry on collision.
            #[must_use]
            pub fn generate() -> Self {
                Self($crate::types::id::random_uid())
            }

            /// Get the underlying string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the UID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(uid: String) -> Self {
                Self(uid)
            }
        }

        impl From<$name> for String {
            fn from(uid: $name) -> Self {
                uid.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let uid = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(uid))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_uid!(ItemUid);
define_uid!(PurchaseUid);
define_uid!(UserUid);
define_uid!(DeviceUid);
