pub mod rotator;

pub use rotator::{ CredentialLease, CredentialRotator, PoolStatus };
