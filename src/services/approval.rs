//! Eligibility of a business owner to list vehicles.

use thiserror::Error;

use crate::models::user::{AccountStatus, User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("The selected account is not a business owner.")]
    NotAnOwner,
    #[error("This business owner's account is still pending approval. Vehicles can be added once an admin approves it.")]
    Pending,
    #[error("This business owner's account was rejected. Vehicles cannot be added for rejected owners.")]
    Rejected,
    #[error("{}", missing_documents_message(*permit, *registration))]
    MissingDocuments { permit: bool, registration: bool },
}

impl Ineligible {
    pub fn code(&self) -> &'static str {
        match self {
            Ineligible::NotAnOwner => "not_an_owner",
            Ineligible::Pending => "pending",
            Ineligible::Rejected => "rejected",
            Ineligible::MissingDocuments { .. } => "missing_documents",
        }
    }
}

/// The flags mark which documents are missing.
fn missing_documents_message(permit: bool, registration: bool) -> String {
    let missing = match (permit, registration) {
        (true, true) => "business permit and business registration",
        (true, false) => "business permit",
        _ => "business registration",
    };
    format!(
        "This business owner has not uploaded the required documents (missing: {}).",
        missing
    )
}

fn present(url: &Option<String>) -> bool {
    url.as_deref().is_some_and(|u| !u.trim().is_empty())
}

pub fn check_owner_eligibility(owner: &User) -> Result<(), Ineligible> {
    if owner.role != UserRole::Owner {
        return Err(Ineligible::NotAnOwner);
    }

    match owner.status {
        AccountStatus::Pending => return Err(Ineligible::Pending),
        AccountStatus::Rejected => return Err(Ineligible::Rejected),
        AccountStatus::Approved => {}
    }

    let permit = !present(&owner.business_permit_url);
    let registration = !present(&owner.business_registration_url);
    if permit || registration {
        return Err(Ineligible::MissingDocuments {
            permit,
            registration,
        });
    }

    Ok(())
}
