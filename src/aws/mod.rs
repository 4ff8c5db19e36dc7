pub mod credentials;

pub use credentials::{AwsCredentials, CredentialsMetadata};
