//! Property tests for pagination clamping and global id parsing.

use agent_cache::domain::models::page::{MAX_LIMIT, MAX_OFFSET};
use agent_cache::domain::models::{ChainPrefix, GlobalId, Page, PageRequest};
use proptest::prelude::*;

fn chain_prefix() -> impl Strategy<Value = ChainPrefix> {
    prop::sample::select(ChainPrefix::ALL.to_vec())
}

proptest! {
    #[test]
    fn clamped_request_stays_in_bounds(limit in any::<u32>(), offset in any::<u32>()) {
        let page = PageRequest::new(limit, offset).clamped();
        prop_assert!((1..=MAX_LIMIT).contains(&page.limit));
        prop_assert!(page.offset <= MAX_OFFSET);
        prop_assert_eq!(page.clamped(), page);
    }

    #[test]
    fn has_more_matches_window(total in 0u64..500, limit in 1u32..=100, offset in 0u32..600) {
        let request = PageRequest::new(limit, offset).clamped();
        let returned = total
            .saturating_sub(u64::from(request.offset))
            .min(u64::from(request.limit));
        let items = vec![(); usize::try_from(returned).unwrap()];

        let page = Page::new(items, total, request);
        prop_assert_eq!(page.has_more, u64::from(request.offset) + returned < total);
    }

    #[test]
    fn global_id_display_parses_back(
        prefix in chain_prefix(),
        chain_id in any::<u64>(),
        raw in "[A-Za-z0-9][A-Za-z0-9:._-]{0,40}",
    ) {
        let chain_id = prefix.requires_chain_id().then_some(chain_id);
        let id = GlobalId::new(prefix, chain_id, raw.clone()).unwrap();

        let parsed: GlobalId = id.to_string().parse().unwrap();
        prop_assert_eq!(parsed.chain_prefix(), prefix);
        prop_assert_eq!(parsed.chain_id(), chain_id);
        prop_assert_eq!(parsed.raw_id(), raw.as_str());
        prop_assert_eq!(parsed, id);
    }
}
