pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod format_csv;
pub mod format_detect;
pub mod logging;
pub mod masking;
pub mod output;
pub mod table;
pub mod validation;

pub use client::{QueryClient, QueryRequest, default_client, query, test_connection};
pub use credentials::{ConfigurationSource, CredentialResolver, Credentials, DatabricksCfgSource};
pub use error::GatewayError;
pub use table::{CellValue, ColumnMeta, ResultTable};
pub use validation::{Classification, classify};
