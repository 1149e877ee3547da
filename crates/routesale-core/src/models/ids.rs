//! Identifier newtypes, all backed by UUID v7 (time-sortable).

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new unique ID using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s.trim())?))
            }
        }
    };
}

uuid_id!(
    /// Customer identifier
    CustomerId
);
uuid_id!(
    /// Sale identifier
    SaleId
);
uuid_id!(
    /// Payment identifier
    PaymentId
);
uuid_id!(
    /// Stock distribution identifier
    DistributionId
);
uuid_id!(
    /// Order aggregate identifier
    OrderId
);
uuid_id!(
    /// Order line identifier
    OrderItemId
);
uuid_id!(
    /// Order event identifier
    OrderEventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn ids_parse_their_display_form() {
        let id = CustomerId::new();
        let parsed: CustomerId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<CustomerId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = SaleId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
