use std::time::Duration;

/// filter value that matches every category.
pub const ALL_CATEGORIES: &str = "all";

/// category assigned to every record pulled from the remote source.
pub const SERVER_CATEGORY: &str = "ServerData";

pub const DEFAULT_REMOTE_URL: &str = "https://jsonplaceholder.typicode.com";
pub const DEFAULT_REMOTE_BATCH_SIZE: usize = 5;
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(20);

pub const EXPORT_FILE_NAME: &str = "quotes.json";

pub const DEFAULT_QUOTES: [(i64, &str, &str); 3] = [
    (
        1,
        "The best way to predict the future is to invent it.",
        "Inspiration",
    ),
    (
        2,
        "Code is like humor. When you have to explain it, it's bad.",
        "Programming",
    ),
    (
        3,
        "Do not wait to strike till the iron is hot, but make it hot by striking.",
        "Motivation",
    ),
];
