use uuid::Uuid;

use crate::models::Role;

/// The authenticated caller of a request, as established by the credential verifier.
///
/// The role claim is kept verbatim so that rank checks stay total over strings:
/// an unrecognized claim has no [`Role`] and ranks 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role_claim: String,
    pub role: Option<Role>,
}

impl Actor {
    pub fn new(id: Uuid, role_claim: impl Into<String>) -> Self {
        let role_claim = role_claim.into();
        let role = Role::parse(&role_claim);
        Self {
            id,
            role_claim,
            role,
        }
    }

    pub fn is(&self, id: Uuid) -> bool {
        self.id == id
    }
}
