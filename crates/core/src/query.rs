use crate::models::QueryIntent;
use regex::Regex;

/// Surface keyword -> canonical category. Longest surface phrase wins, so
/// "t shirt" resolves before "shirt" does.
const CATEGORY_SURFACES: &[(&str, &str)] = &[
    ("shoes", "shoes"),
    ("shoe", "shoes"),
    ("footwear", "shoes"),
    ("sneakers", "shoes"),
    ("sneaker", "shoes"),
    ("boots", "shoes"),
    ("boot", "shoes"),
    ("sandals", "shoes"),
    ("sandal", "shoes"),
    ("heels", "shoes"),
    ("heel", "shoes"),
    ("flats", "shoes"),
    ("flat", "shoes"),
    ("shirt", "tops"),
    ("shirts", "tops"),
    ("top", "tops"),
    ("tops", "tops"),
    ("t-shirt", "tops"),
    ("t shirt", "tops"),
    ("tshirt", "tops"),
    ("blouse", "tops"),
    ("blouses", "tops"),
    ("sweater", "tops"),
    ("sweaters", "tops"),
    ("hoodie", "tops"),
    ("hoodies", "tops"),
    ("pants", "bottoms"),
    ("pant", "bottoms"),
    ("trousers", "bottoms"),
    ("trouser", "bottoms"),
    ("jeans", "bottoms"),
    ("jean", "bottoms"),
    ("shorts", "bottoms"),
    ("skirt", "bottoms"),
    ("skirts", "bottoms"),
    ("accessory", "accessories"),
    ("accessories", "accessories"),
    ("bag", "accessories"),
    ("bags", "accessories"),
    ("handbag", "accessories"),
    ("handbags", "accessories"),
    ("watch", "accessories"),
    ("watches", "accessories"),
    ("sunglasses", "accessories"),
    ("belt", "accessories"),
    ("belts", "accessories"),
    ("jewelry", "accessories"),
    ("jewellery", "accessories"),
    ("dress", "dresses"),
    ("dresses", "dresses"),
    ("gown", "dresses"),
    ("gowns", "dresses"),
    ("jacket", "outerwear"),
    ("jackets", "outerwear"),
    ("coat", "outerwear"),
    ("coats", "outerwear"),
    ("blazer", "outerwear"),
    ("blazers", "outerwear"),
    ("parka", "outerwear"),
    ("parkas", "outerwear"),
];

const CANONICAL_CATEGORIES: &[&str] = &[
    "shoes",
    "tops",
    "bottoms",
    "accessories",
    "dresses",
    "outerwear",
];

const NEGATION_MARKERS: &[&str] = &["not", "no", "exclude", "except", "without", "avoid"];

const CONJUNCTIONS: &[&str] = &["and", "but", "or"];

const STOPWORDS: &[&str] = &[
    "show", "me", "find", "search", "that", "would", "match", "this", "these", "those", "outfit",
    "items", "item", "similar", "to", "with", "the", "a", "an", "for", "in", "of", "i", "want",
    "some", "something", "is", "are", "like",
];

/// Turns free text into a [`QueryIntent`]. Never fails: text that matches
/// nothing structured degrades to a bag of non-stopword keywords.
pub struct QueryParser {
    range: Regex,
    upper_bound: Regex,
    lower_bound: Regex,
    dollars_word: Regex,
    bare_dollar: Regex,
}

impl QueryParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            range: Regex::new(r"\$?(\d+(?:\.\d+)?)\s*-\s*\$?(\d+(?:\.\d+)?)")?,
            upper_bound: Regex::new(
                r"\b(?:under|below|cheaper\s+than|less\s+than|max(?:imum)?)\s+\$?(\d+(?:\.\d+)?)",
            )?,
            lower_bound: Regex::new(
                r"\b(?:over|above|more\s+than|min(?:imum)?)\s+\$?(\d+(?:\.\d+)?)",
            )?,
            dollars_word: Regex::new(r"\b(\d+(?:\.\d+)?)\s*dollars?\b")?,
            bare_dollar: Regex::new(r"\$(\d+(?:\.\d+)?)")?,
        })
    }

    pub fn parse(&self, text: &str) -> QueryIntent {
        let mut intent = QueryIntent::default();
        let lowered = text.to_lowercase();
        if lowered.trim().is_empty() {
            return intent;
        }

        let masked = self.extract_prices(&lowered, &mut intent);
        if let (Some(min), Some(max)) = (intent.min_price, intent.max_price) {
            // Inverted bounds are a parse anomaly, normalized silently.
            if min > max {
                intent.min_price = Some(max);
                intent.max_price = Some(min);
            }
        }

        for clause in masked.split(['.', ',', ';', '!', '?']) {
            self.scan_clause(clause, &mut intent);
        }
        intent
    }

    /// Consumes price phrases from the lowered text, returning a copy with
    /// the matched spans blanked out so their tokens never leak into
    /// keywords. A bare count like "50 items" carries no price marker and
    /// is left alone.
    fn extract_prices(&self, lowered: &str, intent: &mut QueryIntent) -> String {
        let mut consumed: Vec<(usize, usize)> = Vec::new();
        let overlaps = |consumed: &[(usize, usize)], start: usize, end: usize| {
            consumed.iter().any(|&(s, e)| start < e && s < end)
        };

        for capture in self.range.captures_iter(lowered) {
            let span = capture.get(0).map(|m| (m.start(), m.end()));
            let (Some((start, end)), Some(low), Some(high)) =
                (span, capture.get(1), capture.get(2))
            else {
                continue;
            };
            if overlaps(&consumed, start, end) {
                continue;
            }
            if let (Ok(low), Ok(high)) = (low.as_str().parse(), high.as_str().parse()) {
                intent.min_price = Some(low);
                intent.max_price = Some(high);
                consumed.push((start, end));
            }
        }

        let mut bound = |regex: &Regex, upper: bool, intent: &mut QueryIntent, consumed: &mut Vec<(usize, usize)>| {
            for capture in regex.captures_iter(lowered) {
                let span = capture.get(0).map(|m| (m.start(), m.end()));
                let (Some((start, end)), Some(value)) = (span, capture.get(1)) else {
                    continue;
                };
                if overlaps(consumed, start, end) {
                    continue;
                }
                let Ok(value) = value.as_str().parse::<f64>() else {
                    continue;
                };
                if upper {
                    // Keep the most restrictive ceiling.
                    if intent.max_price.is_none() || intent.max_price.is_some_and(|m| value < m) {
                        intent.max_price = Some(value);
                    }
                } else if intent.min_price.is_none()
                    || intent.min_price.is_some_and(|m| value > m)
                {
                    intent.min_price = Some(value);
                }
                consumed.push((start, end));
            }
        };

        bound(&self.upper_bound, true, intent, &mut consumed);
        bound(&self.lower_bound, false, intent, &mut consumed);

        // Bare "$50" / "50 dollars" without a qualifier reads as a budget
        // ceiling. Both surface forms are covered by tests.
        for regex in [&self.dollars_word, &self.bare_dollar] {
            for capture in regex.captures_iter(lowered) {
                let span = capture.get(0).map(|m| (m.start(), m.end()));
                let (Some((start, end)), Some(value)) = (span, capture.get(1)) else {
                    continue;
                };
                if overlaps(&consumed, start, end) {
                    continue;
                }
                if let Ok(value) = value.as_str().parse::<f64>() {
                    if intent.max_price.is_none() {
                        intent.max_price = Some(value);
                    }
                    consumed.push((start, end));
                }
            }
        }

        let mut masked = lowered.as_bytes().to_vec();
        for (start, end) in consumed {
            for byte in &mut masked[start..end] {
                *byte = b' ';
            }
        }
        String::from_utf8(masked).unwrap_or_else(|_| lowered.to_string())
    }

    fn scan_clause(&self, clause: &str, intent: &mut QueryIntent) {
        let tokens: Vec<&str> = clause
            .split_whitespace()
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
            .filter(|token| !token.is_empty())
            .collect();

        let mut excluding = false;
        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index];

            if NEGATION_MARKERS.contains(&token) {
                excluding = true;
                index += 1;
                continue;
            }
            if CONJUNCTIONS.contains(&token) {
                excluding = false;
                index += 1;
                continue;
            }

            // Prefer the longest surface phrase at this position.
            let mut surface = token.to_string();
            let mut canonical = lookup_category(token);
            let mut advance = 1;
            if index + 1 < tokens.len() {
                let pair = format!("{} {}", token, tokens[index + 1]);
                if let Some(mapped) = lookup_category(&pair) {
                    surface = pair;
                    canonical = Some(mapped);
                    advance = 2;
                }
            }

            if excluding {
                if !STOPWORDS.contains(&surface.as_str()) {
                    intent.exclude_keywords.insert(surface.clone());
                    // A synonym like "boots" only excludes at keyword level;
                    // only a canonical name excludes the whole category.
                    if CANONICAL_CATEGORIES.contains(&surface.as_str()) {
                        if let Some(canonical) = canonical {
                            intent.exclude_categories.insert(canonical.to_string());
                        }
                    }
                }
            } else if let Some(canonical) = canonical {
                intent.categories.insert(canonical.to_string());
                push_keyword(&mut intent.keywords, &surface);
            } else if !STOPWORDS.contains(&surface.as_str())
                && !surface.chars().all(|c| c.is_ascii_digit())
            {
                push_keyword(&mut intent.keywords, &surface);
            }

            index += advance;
        }
    }
}

fn lookup_category(surface: &str) -> Option<&'static str> {
    CATEGORY_SURFACES
        .iter()
        .find(|(candidate, _)| *candidate == surface)
        .map(|(_, canonical)| *canonical)
}

fn push_keyword(keywords: &mut Vec<String>, keyword: &str) {
    if !keywords.iter().any(|existing| existing == keyword) {
        keywords.push(keyword.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::QueryParser;

    fn parser() -> QueryParser {
        QueryParser::new().expect("static patterns compile")
    }

    #[test]
    fn empty_text_yields_empty_intent() {
        let intent = parser().parse("   ");
        assert!(intent.categories.is_empty());
        assert!(intent.keywords.is_empty());
        assert!(intent.min_price.is_none());
        assert!(intent.max_price.is_none());
    }

    #[test]
    fn category_synonyms_resolve_to_canonical() {
        let parser = parser();
        for (surface, canonical) in [
            ("sneakers", "shoes"),
            ("heels", "shoes"),
            ("hoodie", "tops"),
            ("jeans", "bottoms"),
            ("handbag", "accessories"),
            ("gown", "dresses"),
            ("parka", "outerwear"),
        ] {
            let intent = parser.parse(surface);
            assert!(
                intent.categories.contains(canonical),
                "{surface} should resolve to {canonical}"
            );
        }
    }

    #[test]
    fn longest_surface_phrase_wins() {
        let intent = parser().parse("white t shirt");
        assert!(intent.categories.contains("tops"));
        assert!(intent.keywords.contains(&"t shirt".to_string()));
        assert!(!intent.keywords.contains(&"shirt".to_string()));
    }

    #[test]
    fn multiple_categories_are_all_retained() {
        let intent = parser().parse("sneakers and a hoodie with jeans");
        assert!(intent.categories.contains("shoes"));
        assert!(intent.categories.contains("tops"));
        assert!(intent.categories.contains("bottoms"));
    }

    #[test]
    fn under_price_sets_only_max() {
        let intent = parser().parse("dresses under $80");
        assert_eq!(intent.max_price, Some(80.0));
        assert_eq!(intent.min_price, None);
    }

    #[test]
    fn over_price_sets_only_min() {
        let intent = parser().parse("watches over $200");
        assert_eq!(intent.min_price, Some(200.0));
        assert_eq!(intent.max_price, None);
    }

    #[test]
    fn price_range_sets_both_bounds() {
        let intent = parser().parse("jackets $50-$100");
        assert_eq!(intent.min_price, Some(50.0));
        assert_eq!(intent.max_price, Some(100.0));
    }

    #[test]
    fn inverted_bounds_are_swapped_not_rejected() {
        let intent = parser().parse("over $100 under $50");
        assert_eq!(intent.min_price, Some(50.0));
        assert_eq!(intent.max_price, Some(100.0));
    }

    #[test]
    fn bare_dollar_amount_reads_as_ceiling() {
        let intent = parser().parse("black dress $50");
        assert_eq!(intent.max_price, Some(50.0));
        assert_eq!(intent.min_price, None);
    }

    #[test]
    fn dollars_word_form_reads_as_ceiling() {
        let intent = parser().parse("black dress 50 dollars");
        assert_eq!(intent.max_price, Some(50.0));
        assert_eq!(intent.min_price, None);
    }

    #[test]
    fn bare_count_is_not_a_price() {
        let intent = parser().parse("show me 50 items");
        assert_eq!(intent.max_price, None);
        assert_eq!(intent.min_price, None);
        assert!(!intent.keywords.contains(&"50".to_string()));
    }

    #[test]
    fn price_tokens_never_leak_into_keywords() {
        let intent = parser().parse("boots under $90");
        assert!(!intent.keywords.contains(&"under".to_string()));
        assert!(!intent.keywords.contains(&"90".to_string()));
    }

    #[test]
    fn negated_tokens_become_keyword_exclusions() {
        let intent = parser().parse("shoes but not boots");
        assert!(intent.exclude_keywords.contains("boots"));
        assert!(!intent.keywords.contains(&"boots".to_string()));
        assert!(intent.categories.contains("shoes"));
    }

    #[test]
    fn negating_a_synonym_does_not_exclude_its_category() {
        let intent = parser().parse("shoes without sneakers");
        assert!(intent.exclude_keywords.contains("sneakers"));
        assert!(intent.exclude_categories.is_empty());
    }

    #[test]
    fn negating_a_canonical_name_excludes_the_category() {
        let intent = parser().parse("everything except shoes");
        assert!(intent.exclude_keywords.contains("shoes"));
        assert!(intent.exclude_categories.contains("shoes"));
    }

    #[test]
    fn exclusion_scope_ends_at_conjunction() {
        let intent = parser().parse("no boots but red heels");
        assert!(intent.exclude_keywords.contains("boots"));
        assert!(intent.keywords.contains(&"red".to_string()));
        assert!(intent.keywords.contains(&"heels".to_string()));
    }

    #[test]
    fn exclusion_scope_ends_at_clause_boundary() {
        let intent = parser().parse("without boots, red heels");
        assert!(intent.exclude_keywords.contains("boots"));
        assert!(intent.keywords.contains(&"heels".to_string()));
    }

    #[test]
    fn exclusion_only_query_has_no_positive_content() {
        let intent = parser().parse("no boots");
        assert!(intent.categories.is_empty());
        assert!(intent.keywords.is_empty());
        assert!(intent.exclude_keywords.contains("boots"));
    }

    #[test]
    fn keywords_preserve_first_occurrence_order() {
        let intent = parser().parse("red velvet red dress");
        assert_eq!(intent.keywords, vec!["red", "velvet", "dress"]);
    }

    #[test]
    fn black_sneakers_scenario() {
        let intent = parser().parse("black sneakers under $50 but not boots");
        assert!(intent.categories.contains("shoes"));
        assert_eq!(intent.max_price, Some(50.0));
        assert_eq!(intent.min_price, None);
        assert!(intent.exclude_keywords.contains("boots"));
        assert!(intent.exclude_categories.is_empty());
        assert_eq!(intent.keywords, vec!["black", "sneakers"]);
    }
}
