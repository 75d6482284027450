pub mod billing;
pub mod paystack;
