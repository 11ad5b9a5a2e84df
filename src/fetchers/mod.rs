//! Page fetcher implementations

pub mod naver;

pub use naver::NaverLandFetcher;
