//! Newtype IDs for type-safe entity references.
//!
//! Every remotely-stored entity is keyed by a UUID. The `entity_id!` macro
//! creates a distinct wrapper type per entity so a `ProductId` can never be
//! passed where a `CartLineId` is expected.

/// Define a UUID-backed, type-safe ID wrapper.
///
/// The generated type is `Copy`, hashable, `#[serde(transparent)]`, and
/// displays as the canonical hyphenated UUID form.
///
/// # Example
///
/// ```rust
/// # use solera_core::entity_id;
/// entity_id!(WarehouseId);
///
/// let id = WarehouseId::generate();
/// assert_eq!(id, WarehouseId::new(id.as_uuid()));
/// ```
#[macro_export]
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Ok(Self(s.parse::<::uuid::Uuid>()?))
            }
        }
    };
}

// Standard entity IDs
entity_id!(UserId);
entity_id!(ProductId);
entity_id!(VariantId);
entity_id!(CartLineId);
entity_id!(OrderId);
