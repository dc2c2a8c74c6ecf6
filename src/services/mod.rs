pub mod approval;
pub mod login_guard;
pub mod reports;
pub mod storage;
