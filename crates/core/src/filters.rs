use crate::models::{ExplicitFilters, FilterCondition, FilterPredicate, QueryIntent};

/// Merges parsed intent with caller-supplied filters into one flat
/// conjunction.
///
/// Merge policy: explicit category/brand/gender/color/price values win over
/// parsed ones for positive inclusion; exclusions from the intent are
/// always appended regardless of explicit filters; explicit price bounds
/// replace parsed bounds entirely. Disjunction between conditions is not
/// supported by choice (the only OR lives inside `AnyTagOf`), which keeps
/// store translation trivial.
pub struct FilterBuilder;

impl FilterBuilder {
    pub fn build(intent: &QueryIntent, explicit: &ExplicitFilters) -> FilterPredicate {
        let mut predicate = FilterPredicate::default();

        if let Some(category) = non_empty(explicit.category.as_deref()) {
            predicate.push(FilterCondition::Equals {
                field: "category".to_string(),
                value: category.to_string(),
            });
        } else if !intent.categories.is_empty() {
            // Multiple parsed categories are alternatives, not a conjunction.
            predicate.push(FilterCondition::AnyTagOf {
                field: "category".to_string(),
                values: intent.categories.iter().cloned().collect(),
            });
        }

        if let Some(brand) = non_empty(explicit.brand.as_deref()) {
            predicate.push(FilterCondition::Equals {
                field: "brand".to_string(),
                value: brand.to_string(),
            });
        }

        if let Some(gender) = non_empty(explicit.gender.as_deref()) {
            predicate.push(FilterCondition::Equals {
                field: "gender".to_string(),
                value: gender.to_string(),
            });
        }

        let colors: Vec<String> = explicit
            .colors
            .iter()
            .filter(|color| !color.trim().is_empty())
            .cloned()
            .collect();
        if !colors.is_empty() {
            predicate.push(FilterCondition::AnyTagOf {
                field: "colors".to_string(),
                values: colors,
            });
        }

        let explicit_min = price_bound(explicit.min_price);
        let explicit_max = price_bound(explicit.max_price);
        let (min_price, max_price) = if explicit_min.is_some() || explicit_max.is_some() {
            (explicit_min, explicit_max)
        } else {
            (intent.min_price, intent.max_price)
        };
        if let Some(min) = min_price {
            predicate.push(FilterCondition::MinPrice(min));
        }
        if let Some(max) = max_price {
            predicate.push(FilterCondition::MaxPrice(max));
        }

        for category in &intent.exclude_categories {
            predicate.push(FilterCondition::NotLike {
                field: "category".to_string(),
                pattern: category.clone(),
            });
        }
        for keyword in &intent.exclude_keywords {
            for field in ["title", "category", "sub_category"] {
                predicate.push(FilterCondition::NotLike {
                    field: field.to_string(),
                    pattern: keyword.clone(),
                });
            }
        }

        predicate.push(FilterCondition::Active);
        predicate
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A bound of exactly zero means "no filter" on the wire.
fn price_bound(value: Option<f64>) -> Option<f64> {
    value.filter(|price| *price > 0.0)
}

#[cfg(test)]
mod tests {
    use super::FilterBuilder;
    use crate::models::{ExplicitFilters, FilterCondition, QueryIntent};

    fn intent_with_category(category: &str) -> QueryIntent {
        let mut intent = QueryIntent::default();
        intent.categories.insert(category.to_string());
        intent
    }

    #[test]
    fn explicit_category_overrides_parsed_one() {
        let intent = intent_with_category("shoes");
        let explicit = ExplicitFilters {
            category: Some("dresses".to_string()),
            ..Default::default()
        };
        let predicate = FilterBuilder::build(&intent, &explicit);
        assert!(predicate.conditions.contains(&FilterCondition::Equals {
            field: "category".to_string(),
            value: "dresses".to_string(),
        }));
        assert!(!predicate
            .conditions
            .iter()
            .any(|c| matches!(c, FilterCondition::AnyTagOf { field, .. } if field == "category")));
    }

    #[test]
    fn parsed_categories_become_alternatives() {
        let mut intent = intent_with_category("shoes");
        intent.categories.insert("tops".to_string());
        let predicate = FilterBuilder::build(&intent, &ExplicitFilters::default());
        let found = predicate.conditions.iter().find_map(|c| match c {
            FilterCondition::AnyTagOf { field, values } if field == "category" => Some(values),
            _ => None,
        });
        let values = found.expect("category alternatives present");
        assert!(values.contains(&"shoes".to_string()));
        assert!(values.contains(&"tops".to_string()));
    }

    #[test]
    fn intent_exclusions_survive_explicit_filters() {
        let mut intent = QueryIntent::default();
        intent.exclude_keywords.insert("boots".to_string());
        let explicit = ExplicitFilters {
            category: Some("shoes".to_string()),
            ..Default::default()
        };
        let predicate = FilterBuilder::build(&intent, &explicit);
        assert!(predicate.conditions.contains(&FilterCondition::NotLike {
            field: "title".to_string(),
            pattern: "boots".to_string(),
        }));
    }

    #[test]
    fn explicit_price_replaces_parsed_bounds_entirely() {
        let mut intent = QueryIntent::default();
        intent.min_price = Some(10.0);
        intent.max_price = Some(50.0);
        let explicit = ExplicitFilters {
            max_price: Some(200.0),
            ..Default::default()
        };
        let predicate = FilterBuilder::build(&intent, &explicit);
        assert!(predicate
            .conditions
            .contains(&FilterCondition::MaxPrice(200.0)));
        // Parsed min is dropped, not intersected.
        assert!(!predicate
            .conditions
            .iter()
            .any(|c| matches!(c, FilterCondition::MinPrice(_))));
    }

    #[test]
    fn zero_price_bound_means_no_filter() {
        let explicit = ExplicitFilters {
            min_price: Some(0.0),
            max_price: Some(0.0),
            ..Default::default()
        };
        let predicate = FilterBuilder::build(&QueryIntent::default(), &explicit);
        assert!(!predicate
            .conditions
            .iter()
            .any(|c| matches!(c, FilterCondition::MinPrice(_) | FilterCondition::MaxPrice(_))));
    }

    #[test]
    fn predicate_always_ends_with_active_condition() {
        let predicate = FilterBuilder::build(&QueryIntent::default(), &ExplicitFilters::default());
        assert_eq!(predicate.conditions.last(), Some(&FilterCondition::Active));
    }

    #[test]
    fn excluded_category_becomes_negated_match() {
        let mut intent = QueryIntent::default();
        intent.exclude_categories.insert("shoes".to_string());
        let predicate = FilterBuilder::build(&intent, &ExplicitFilters::default());
        assert!(predicate.conditions.contains(&FilterCondition::NotLike {
            field: "category".to_string(),
            pattern: "shoes".to_string(),
        }));
    }
}
