/// Candidate view-count keys, highest priority first.
///
/// Localised spellings come first because the automation workflows scrape
/// Chinese-language pages; the English names cover API-backed workflows.
pub const VIEW_COUNT_KEYS: &[&str] = &[
    "播放量",
    "播放数",
    "观看量",
    "观看次数",
    "views",
    "viewCount",
    "view_count",
    "playCount",
    "play_count",
    "totalViews",
];
