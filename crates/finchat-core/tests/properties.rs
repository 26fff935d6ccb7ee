//! Property tests for chunking coverage and the context budget.

use chrono::{TimeZone, Utc};
use finchat_core::chunks::reassemble;
use finchat_core::{
    aggregate, chunk_text, Chunk, CompanyFacts, ContextSources, NewsItem, RetrievedSet, ScoredChunk,
};
use proptest::prelude::*;

fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zA-Z0-9%$]{1,12}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("é€".to_string()),
        ],
        0..400,
    )
    .prop_map(|parts| parts.concat())
}

fn arb_news(prefix: &'static str) -> impl Strategy<Value = Vec<NewsItem>> {
    let item = ("[a-z ]{1,40}", proptest::option::of(1u32..28));
    proptest::collection::vec(item, 0..6).prop_map(move |items| {
        items
            .into_iter()
            .map(|(headline, day)| NewsItem {
                headline: format!("{prefix} {headline}"),
                summary: headline.clone(),
                published_at: day.map(|d| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()),
                source: prefix.to_string(),
            })
            .collect()
    })
}

fn arb_sources() -> impl Strategy<Value = ContextSources> {
    (
        proptest::option::of("[A-Z]{1,5}"),
        proptest::collection::vec("[a-z .]{1,200}", 0..6),
        arb_news("curated"),
        arb_news("live"),
    )
        .prop_map(|(ticker, texts, curated_news, live_news)| ContextSources {
            facts: ticker.map(|t| CompanyFacts::unavailable(&t)),
            retrieved: RetrievedSet {
                hits: texts
                    .into_iter()
                    .enumerate()
                    .map(|(id, text)| ScoredChunk {
                        chunk: Chunk {
                            id,
                            text,
                            source_offset: 0,
                        },
                        score: 0.5,
                    })
                    .collect(),
                label: "doc".into(),
                version: 1,
            },
            curated_news,
            live_news,
        })
}

fn has_content(s: &ContextSources) -> bool {
    s.facts.is_some()
        || !s.retrieved.is_empty()
        || !s.curated_news.is_empty()
        || !s.live_news.is_empty()
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_text_within_bounds(
            text in arb_text(),
            (max_chars, overlap) in (2usize..300).prop_flat_map(|m| (Just(m), 0..m)),
        ) {
            let chunks = chunk_text(&text, max_chars, overlap).unwrap();
            prop_assert_eq!(reassemble(&chunks), text.clone());
            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.id, i);
                prop_assert!(c.char_len() <= max_chars);
                prop_assert!(c.char_len() > 0);
            }
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].source_offset > pair[0].source_offset);
                let prev_end = pair[0].source_offset + pair[0].char_len();
                prop_assert_eq!(prev_end - pair[1].source_offset, overlap);
            }
            if text.is_empty() {
                prop_assert!(chunks.is_empty());
            }
        }
    }
}

mod prop_budget {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn blob_never_exceeds_budget(sources in arb_sources(), budget in 0usize..2_000) {
            let blob = aggregate(&sources, budget);
            prop_assert!(blob.char_len() <= budget);
            let full = aggregate(&sources, usize::MAX);
            prop_assert!(full.text.starts_with(&blob.text));
            prop_assert_eq!(blob.truncated, full.char_len() > budget);
        }

        #[test]
        fn zero_budget_is_empty_and_flagged(sources in arb_sources()) {
            let blob = aggregate(&sources, 0);
            prop_assert!(blob.is_empty());
            prop_assert_eq!(blob.truncated, has_content(&sources));
        }
    }
}
