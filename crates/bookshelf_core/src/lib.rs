pub mod catalog;
pub mod domain;
pub mod ports;

pub use domain::{
    Book, BookChanges, BookDraft, Bookmark, BookmarkWithBook, Category, ContentBlock,
    FeaturedBooks, Layout, NewContentBlock, NewUser, ProfileUpdate, User, UserCredentials,
};
pub use ports::{DatabaseService, FileStorageService, PortError, PortResult};
