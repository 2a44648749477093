//! Render-time filtering of statuses.
//!
//! Decisions read only [`PostView::search_index`], which is normalized once
//! when the view is built. Compiled matchers are shared through a
//! [`FilterCache`] keyed by the active rule set.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::document::searchable_text;
use crate::error::Result;
use crate::filter::{CacheStats, FilterCache, active_filters};
use crate::model::{AccountId, FilterDecision, FilterRule, Post, PostView, TimelineEntry};
use crate::normalize::normalize;
use crate::perf::{self, Timer};

impl PostView {
    /// Project a post for rendering.
    ///
    /// `reblog_target` is the boosted post when `post` is a reblog; its text
    /// is what gets displayed and filtered.
    #[must_use]
    pub fn from_post(post: &Post, reblog_target: Option<&Post>) -> Self {
        Self {
            id: post.id,
            account_id: post.account_id,
            search_index: normalize(&searchable_text(post)),
            reblog: reblog_target.map(|target| Box::new(Self::from_post(target, None))),
        }
    }
}

/// Decides drop/hide for statuses on behalf of one or more viewers.
#[derive(Debug, Default)]
pub struct ResultFilterEvaluator {
    cache: FilterCache,
}

impl ResultFilterEvaluator {
    #[must_use]
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache: FilterCache::new(cache_size),
        }
    }

    /// Decide how `post` renders for `viewer` in `column`.
    ///
    /// Reblogs are judged by the boosted status. A viewer's own statuses are
    /// exempt from their filters. Irreversible matches win over reversible
    /// ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the active rules cannot be compiled.
    pub fn evaluate(
        &self,
        post: &PostView,
        viewer: AccountId,
        rules: &[FilterRule],
        column: &str,
        now: DateTime<Utc>,
    ) -> Result<FilterDecision> {
        let timer = Timer::start(perf::FILTER_EVALUATE);
        let decision = self.decide(post, viewer, rules, column, now);
        timer.stop();
        decision
    }

    fn decide(
        &self,
        post: &PostView,
        viewer: AccountId,
        rules: &[FilterRule],
        column: &str,
        now: DateTime<Utc>,
    ) -> Result<FilterDecision> {
        let effective = post.effective();
        if effective.account_id == viewer {
            return Ok(FilterDecision::VISIBLE);
        }

        let active = active_filters(rules, column, now);
        if active.is_empty() {
            return Ok(FilterDecision::VISIBLE);
        }

        let compiled = self.cache.get_or_compile(&active)?;
        let text = effective.search_index.as_str();

        if compiled.drop.as_ref().is_some_and(|m| m.is_match(text)) {
            trace!(post = post.id, "dropped by irreversible filter");
            return Ok(FilterDecision::DROP);
        }

        let hide = compiled.hide.as_ref().is_some_and(|m| m.is_match(text));
        Ok(FilterDecision { drop: false, hide })
    }

    /// Evaluate a timeline in order, leaving out dropped statuses.
    ///
    /// # Errors
    ///
    /// Returns an error if the active rules cannot be compiled.
    pub fn filter_timeline(
        &self,
        posts: &[PostView],
        viewer: AccountId,
        rules: &[FilterRule],
        column: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimelineEntry>> {
        let mut entries = Vec::with_capacity(posts.len());
        for post in posts {
            let decision = self.evaluate(post, viewer, rules, column, now)?;
            if decision.drop {
                continue;
            }
            entries.push(TimelineEntry {
                id: post.id,
                account_id: post.account_id,
                hidden: decision.hide,
            });
        }
        Ok(entries)
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterContext;
    use chrono::Duration;

    const ME: AccountId = 1;
    const OTHER: AccountId = 2;

    fn view(id: i64, account_id: AccountId, text: &str) -> PostView {
        PostView {
            id,
            account_id,
            search_index: normalize(text),
            reblog: None,
        }
    }

    fn rule(id: i64, phrase: &str, irreversible: bool) -> FilterRule {
        FilterRule {
            id,
            account_id: ME,
            phrase: phrase.to_string(),
            whole_word: false,
            context: vec![FilterContext::Home, FilterContext::Public],
            expires_at: None,
            irreversible,
        }
    }

    #[test]
    fn no_rules_means_visible() {
        let evaluator = ResultFilterEvaluator::default();
        let decision = evaluator
            .evaluate(&view(1, OTHER, "anything"), ME, &[], "home", Utc::now())
            .unwrap();
        assert_eq!(decision, FilterDecision::VISIBLE);
    }

    #[test]
    fn reversible_match_hides() {
        let evaluator = ResultFilterEvaluator::default();
        let rules = [rule(1, "spoiler", false)];
        let decision = evaluator
            .evaluate(&view(1, OTHER, "big SPOILER here"), ME, &rules, "home", Utc::now())
            .unwrap();
        assert_eq!(
            decision,
            FilterDecision {
                drop: false,
                hide: true
            }
        );
    }

    #[test]
    fn irreversible_wins_over_hide() {
        let evaluator = ResultFilterEvaluator::default();
        let rules = [rule(1, "spoiler", false), rule(2, "spoiler", true)];
        let decision = evaluator
            .evaluate(&view(1, OTHER, "spoiler"), ME, &rules, "public", Utc::now())
            .unwrap();
        assert_eq!(decision, FilterDecision::DROP);
    }

    #[test]
    fn own_posts_are_exempt() {
        let evaluator = ResultFilterEvaluator::default();
        let rules = [rule(1, "spoiler", true), rule(2, "spoiler", false)];
        let decision = evaluator
            .evaluate(&view(1, ME, "spoiler"), ME, &rules, "home", Utc::now())
            .unwrap();
        assert_eq!(decision, FilterDecision::VISIBLE);
        assert_eq!(evaluator.cache_stats().compiles, 0);
    }

    #[test]
    fn expired_and_out_of_context_rules_are_ignored() {
        let evaluator = ResultFilterEvaluator::default();
        let now = Utc::now();
        let mut expired = rule(1, "spoiler", true);
        expired.expires_at = Some(now - Duration::minutes(1));
        let mut thread_only = rule(2, "spoiler", true);
        thread_only.context = vec![FilterContext::Thread];

        let rules = [expired, thread_only];
        let post = view(1, OTHER, "spoiler");
        assert_eq!(
            evaluator.evaluate(&post, ME, &rules, "home", now).unwrap(),
            FilterDecision::VISIBLE
        );
        assert_eq!(
            evaluator.evaluate(&post, ME, &rules, "thread", now).unwrap(),
            FilterDecision::DROP
        );
        assert_eq!(
            evaluator.evaluate(&post, ME, &rules, "", now).unwrap(),
            FilterDecision::VISIBLE
        );
    }

    #[test]
    fn list_columns_use_home_rules() {
        let evaluator = ResultFilterEvaluator::default();
        let mut home_only = rule(1, "spoiler", false);
        home_only.context = vec![FilterContext::Home];
        let decision = evaluator
            .evaluate(&view(1, OTHER, "spoiler"), ME, &[home_only], "list:7", Utc::now())
            .unwrap();
        assert!(decision.hide);
    }

    #[test]
    fn reblogs_are_judged_by_their_target() {
        let evaluator = ResultFilterEvaluator::default();
        let rules = [rule(1, "spoiler", true)];

        let mut boost = view(10, ME, "");
        boost.reblog = Some(Box::new(view(9, OTHER, "spoiler inside")));
        assert_eq!(
            evaluator.evaluate(&boost, ME, &rules, "home", Utc::now()).unwrap(),
            FilterDecision::DROP
        );

        // Someone else boosting my post: the target is mine, so it survives.
        let mut boost = view(11, OTHER, "");
        boost.reblog = Some(Box::new(view(8, ME, "spoiler inside")));
        assert_eq!(
            evaluator.evaluate(&boost, ME, &rules, "home", Utc::now()).unwrap(),
            FilterDecision::VISIBLE
        );
    }

    #[test]
    fn fullwidth_text_matches_ascii_phrase() {
        let evaluator = ResultFilterEvaluator::default();
        let rules = [rule(1, "abc", false)];
        let decision = evaluator
            .evaluate(&view(1, OTHER, "ＡＢＣ"), ME, &rules, "home", Utc::now())
            .unwrap();
        assert!(decision.hide);
    }

    #[test]
    fn timeline_keeps_order_and_reuses_matchers() {
        let evaluator = ResultFilterEvaluator::new(8);
        let rules = [rule(1, "drop me", true), rule(2, "hide me", false)];
        let posts = [
            view(1, OTHER, "fine"),
            view(2, OTHER, "please drop me"),
            view(3, OTHER, "hide me too"),
            view(4, OTHER, "also fine"),
        ];

        let entries = evaluator
            .filter_timeline(&posts, ME, &rules, "home", Utc::now())
            .unwrap();
        let summary: Vec<(i64, bool)> = entries.iter().map(|e| (e.id, e.hidden)).collect();
        assert_eq!(summary, vec![(1, false), (3, true), (4, false)]);

        let stats = evaluator.cache_stats();
        assert_eq!(stats.compiles, 1);
        assert_eq!(stats.hits, 3);
    }

    #[test]
    fn view_from_post_normalizes_once() {
        let original = Post {
            id: 1,
            account_id: OTHER,
            spoiler_text: String::new(),
            text: "ﾃｽﾄ".to_string(),
            local: true,
            media_attachments: vec![],
            reblog_of_id: None,
            created_at: Utc::now(),
        };
        let mut boost = original.clone();
        boost.id = 2;
        boost.account_id = ME;
        boost.text = String::new();
        boost.reblog_of_id = Some(1);

        let view = PostView::from_post(&boost, Some(&original));
        assert_eq!(view.effective().id, 1);
        assert_eq!(view.effective().search_index, "\n\nテスト");
    }
}
