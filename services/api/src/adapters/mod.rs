pub mod badges;
pub mod db;

pub use badges::HttpBadgeAdapter;
pub use db::DbAdapter;
