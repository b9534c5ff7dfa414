use serde::{Deserialize, Serialize};

use crate::constants::quotes::SERVER_CATEGORY;

use super::quotes::Quote;

/// a record of the remote `/posts` listing. only the fields we map are kept.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemotePost {
    pub id: i64,
    pub title: String,
}

impl From<RemotePost> for Quote {
    fn from(post: RemotePost) -> Self {
        Quote {
            id: post.id,
            text: post.title,
            category: SERVER_CATEGORY.to_string(),
        }
    }
}
