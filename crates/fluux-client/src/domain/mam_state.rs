// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

/// Archive-sync progress for one conversation or room.
///
/// `oldest_fetched_id` is bookkeeping only. The cursor for backward
/// pages is always the oldest stanza-id currently in memory: after an
/// initial "fetch new" query the two can differ, and paging on the
/// stored value would leave a gap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MamQueryState {
    pub is_loading: bool,
    pub has_queried: bool,
    pub is_history_complete: bool,
    pub is_caught_up_to_live: bool,
    pub error: Option<String>,
    pub oldest_fetched_id: Option<String>,
}

impl MamQueryState {
    /// Called on every transition back to online: whatever we knew
    /// about sync progress is stale now.
    pub fn reset(&mut self) {
        *self = MamQueryState::default();
    }
}
