//! Free-text report matching.
//!
//! Scores every report in a catalog against the tokens of a chat utterance
//! and decides between a single winner, an ambiguous shortlist, or no match.

use crate::models::Report;
use crate::normalize::{normalize, tokenize};

const NAME_WEIGHT: u32 = 5;
const KEYWORD_WEIGHT: u32 = 3;
const CATEGORY_WEIGHT: u32 = 2;
const DESCRIPTION_WEIGHT: u32 = 1;

/// A runner-up scoring at least this share of the winner makes the match
/// ambiguous, expressed as a ratio of integers (7/10).
const AMBIGUITY_NUMERATOR: u32 = 7;
const AMBIGUITY_DENOMINATOR: u32 = 10;

/// Maximum number of suggestions returned with a non-match.
pub const SUGGESTION_LIMIT: usize = 3;

/// A scored catalog entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate<'a> {
    pub report: &'a Report,
    pub score: u32,
}

/// Result of resolving an utterance against a catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    /// One report is clearly the best fit.
    Matched(MatchCandidate<'a>),
    /// Several reports score too closely to pick automatically.
    Ambiguous(Vec<MatchCandidate<'a>>),
    /// Nothing scored; carries the first catalog entries as fallbacks.
    NoMatch(Vec<&'a Report>),
}

/// Normalized searchable fields of a report.
struct ReportFields {
    name: String,
    keywords: Vec<String>,
    category: String,
    description: String,
}

impl ReportFields {
    fn of(report: &Report) -> Self {
        Self {
            name: normalize(&report.name),
            keywords: report.keywords.iter().map(|k| normalize(k)).collect(),
            category: report
                .category
                .map(|c| normalize(c.label()))
                .unwrap_or_default(),
            description: normalize(&report.description),
        }
    }
}

fn token_score(token: &str, fields: &ReportFields) -> u32 {
    let mut score = 0;
    if fields.name.contains(token) {
        score += NAME_WEIGHT;
    }
    if fields
        .keywords
        .iter()
        .any(|k| !k.is_empty() && (k.contains(token) || token.contains(k.as_str())))
    {
        score += KEYWORD_WEIGHT;
    }
    if !fields.category.is_empty() && fields.category.contains(token) {
        score += CATEGORY_WEIGHT;
    }
    if fields.description.contains(token) {
        score += DESCRIPTION_WEIGHT;
    }
    score
}

/// Score a single report against pre-tokenized query tokens.
pub fn score_report(tokens: &[String], report: &Report) -> u32 {
    let fields = ReportFields::of(report);
    tokens.iter().map(|t| token_score(t, &fields)).sum()
}

/// Rank active reports by score, highest first.
///
/// Zero-score reports are dropped. Ties keep catalog order.
pub fn rank<'a>(utterance: &str, catalog: &'a [Report]) -> Vec<MatchCandidate<'a>> {
    let tokens = tokenize(utterance);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<MatchCandidate<'a>> = catalog
        .iter()
        .filter(|report| report.active)
        .map(|report| MatchCandidate {
            report,
            score: score_report(&tokens, report),
        })
        .filter(|candidate| candidate.score > 0)
        .collect();

    // sort_by is stable
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

fn is_close(top: u32, runner_up: u32) -> bool {
    runner_up * AMBIGUITY_DENOMINATOR >= top * AMBIGUITY_NUMERATOR
}

/// Resolve an utterance to a report.
pub fn resolve<'a>(utterance: &str, catalog: &'a [Report]) -> MatchOutcome<'a> {
    let mut candidates = rank(utterance, catalog);

    let Some(top) = candidates.first().copied() else {
        return MatchOutcome::NoMatch(
            catalog
                .iter()
                .filter(|report| report.active)
                .take(SUGGESTION_LIMIT)
                .collect(),
        );
    };

    let ambiguous = candidates
        .get(1)
        .is_some_and(|runner_up| is_close(top.score, runner_up.score));

    if ambiguous {
        candidates.truncate(SUGGESTION_LIMIT);
        MatchOutcome::Ambiguous(candidates)
    } else {
        MatchOutcome::Matched(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{clean_keywords, DisplayType, ReportCategory};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn report(name: &str, keywords: &[&str]) -> Report {
        Report {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            name: name.to_string(),
            description: String::new(),
            sql_template: "SELECT 1".to_string(),
            active: true,
            keywords: clean_keywords(keywords),
            category: None,
            display_type: DisplayType::Table,
            example_questions: vec![],
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn names(candidates: &[MatchCandidate<'_>]) -> Vec<String> {
        candidates.iter().map(|c| c.report.name.clone()).collect()
    }

    #[test]
    fn test_daily_sales_scenario() {
        let catalog = vec![
            report("Günlük Satışlar", &["satış", "ciro"]),
            report("Stok Raporu", &["stok"]),
        ];

        match resolve("bugünkü satışlar", &catalog) {
            MatchOutcome::Matched(candidate) => {
                assert_eq!(candidate.report.name, "Günlük Satışlar");
                assert_eq!(candidate.score, 8);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_returns_first_three_active_entries() {
        let mut catalog = vec![
            report("Stok Raporu", &["stok"]),
            report("Kasa", &[]),
            report("Cari Bakiye", &[]),
            report("Tahsilat", &[]),
        ];
        catalog[1].active = false;

        match resolve("geçen ay", &catalog) {
            MatchOutcome::NoMatch(suggestions) => {
                let got: Vec<&str> = suggestions.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(got, vec!["Stok Raporu", "Cari Bakiye", "Tahsilat"]);
            }
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[test]
    fn test_close_scores_are_ambiguous() {
        // fatura: name 5, iade: name 5 => 10
        let strong = report("Fatura İade", &[]);
        // fatura: name 5, iade: keyword 3 => 8, which is at least 70% of 10
        let close = report("Fatura Özeti", &["iade"]);

        let tokens = tokenize("fatura iade");
        assert_eq!(score_report(&tokens, &strong), 10);
        assert_eq!(score_report(&tokens, &close), 8);

        let catalog = vec![close, strong];
        match resolve("fatura iade", &catalog) {
            MatchOutcome::Ambiguous(suggestions) => {
                assert_eq!(names(&suggestions), vec!["Fatura İade", "Fatura Özeti"]);
                assert_eq!(
                    suggestions.iter().map(|c| c.score).collect::<Vec<_>>(),
                    vec![10, 8]
                );
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguity_threshold() {
        assert!(is_close(10, 8));
        assert!(is_close(10, 7));
        assert!(!is_close(10, 6));
        assert!(!is_close(8, 5));
    }

    #[test]
    fn test_clear_winner_is_not_ambiguous() {
        let catalog = vec![
            report("Stok Durumu", &["stok", "depo"]),
            report("Depo Transferleri", &[]),
        ];
        // stok: 5 + 3, depo: 3 => 11 against depo: 5
        match resolve("stok depo", &catalog) {
            MatchOutcome::Matched(candidate) => {
                assert_eq!(candidate.report.name, "Stok Durumu");
                assert_eq!(candidate.score, 11);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_name_beats_single_keyword() {
        let catalog = vec![
            report("Tahsilat", &["kasa"]),
            report("Kasa Hareketleri", &[]),
        ];
        let by_keyword = report("Banka", &["kasa"]);
        let tokens = tokenize("kasa hareketleri");
        assert!(score_report(&tokens, &catalog[1]) > score_report(&tokens, &by_keyword));

        match resolve("kasa hareketleri", &catalog) {
            MatchOutcome::Matched(candidate) => assert_eq!(candidate.report.name, "Kasa Hareketleri"),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_containing_token_counts() {
        // token "satis" is contained in keyword "satislar"
        let entry = report("Özet", &["satışlar"]);
        assert_eq!(score_report(&tokenize("satış"), &entry), 3);
    }

    #[test]
    fn test_category_label_and_description_weights() {
        let mut entry = report("Özet", &[]);
        entry.category = Some(ReportCategory::Finance);
        entry.description = "aylik finans tablosu".into();
        // finans: category 2 + description 1
        assert_eq!(score_report(&tokenize("finans"), &entry), 3);
    }

    #[test]
    fn test_ranking_is_stable_and_deterministic() {
        let catalog = vec![
            report("Satış A", &[]),
            report("Satış B", &[]),
            report("Satış C", &[]),
        ];
        let first = rank("satış", &catalog);
        let second = rank("satış", &catalog);
        assert_eq!(names(&first), vec!["Satış A", "Satış B", "Satış C"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ambiguous_caps_suggestions() {
        let catalog: Vec<Report> = (0..5).map(|i| report(&format!("Satış {}", i), &[])).collect();
        match resolve("satış", &catalog) {
            MatchOutcome::Ambiguous(suggestions) => assert_eq!(suggestions.len(), SUGGESTION_LIMIT),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_inactive_reports_are_ignored() {
        let mut catalog = vec![report("Satış Raporu", &["satış"])];
        catalog[0].active = false;
        assert!(rank("satış", &catalog).is_empty());
    }

    #[test]
    fn test_matching_does_not_mutate_catalog() {
        let catalog = vec![report("Günlük Satışlar", &["satış"])];
        let before = catalog.clone();
        let _ = resolve("satışlar", &catalog);
        assert_eq!(catalog, before);
    }
}
