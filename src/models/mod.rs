mod blog;
mod like;
mod paper;
mod record;
mod repo;

pub use blog::{BlogPost, NewBlogPost};
pub use like::{ItemType, UserLike};
pub use paper::{NewPaper, Paper};
pub use record::{join_list, split_list, NewRecord};
pub use repo::{NewRepo, Repo};
