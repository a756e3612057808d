mod client;
mod token;

pub use client::{
    ApiErrorClass, CopyInfo, CopyStatus, Credential, DirectoryEntry, DirectoryPage,
    FileProperties, ShareClient, ShareError, normalize_path,
};
pub use reqwest::StatusCode;
pub use token::{ReadToken, TokenPermissions};
