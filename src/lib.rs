pub mod core;

pub use crate::core::config::{
    ApiCredentials, ApiOptions, ApiProxy, ExchangeOptions, HttpVersion, RestExchangeOptions,
    SocketExchangeOptions,
};
pub use crate::core::errors::{ErrorKind, ExchangeError};
pub use crate::core::pagination::{DataDirection, PageRequest, PaginationParameters};
pub use crate::core::result::{CallResult, ResponseInfo, WebCallResult};
pub use crate::core::types::KlineInterval;
