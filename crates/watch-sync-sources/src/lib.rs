pub mod emby;
pub mod error;
pub mod omdb;
pub mod traits;

pub use emby::EmbyClient;
pub use error::{CatalogError, ProviderError};
pub use omdb::OmdbClient;
pub use traits::{CatalogClient, ItemPage, ItemQuery, ProviderSearchPage, ProviderSearchResult, RatingProvider};
