use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Workspace identifier used as the partition key for every persisted resource.
    WorkspaceId
}

uuid_id! {
    /// Team identifier scoping roles and assignments below the workspace level.
    TeamId
}

uuid_id! {
    /// Unique identifier for a user record.
    UserId
}

#[cfg(test)]
mod tests {
    use super::{TeamId, UserId, WorkspaceId};

    #[test]
    fn identifiers_round_trip_through_uuid() {
        let workspace_id = WorkspaceId::new();
        assert_eq!(
            WorkspaceId::from_uuid(workspace_id.as_uuid()),
            workspace_id
        );

        let team_id = TeamId::new();
        assert_eq!(TeamId::from_uuid(team_id.as_uuid()), team_id);

        let user_id = UserId::new();
        assert_eq!(UserId::from_uuid(user_id.as_uuid()), user_id);
    }
}
