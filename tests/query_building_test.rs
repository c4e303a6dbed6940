#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use sift::backend::formatter::{LuceneFormatter, QueryFormatter};
    use sift::prelude::*;
    use sift::query::filter::{FilterType, prepare_key, split_expression};
    use sift::query::{QueryLog, SearchQuery};

    fn connection() -> Arc<SearchConnection> {
        Arc::new(
            SearchConnection::new(
                Arc::new(MemoryBackend::new()),
                Arc::new(Registry::new()),
                SiftConfig::default(),
            )
            .with_query_log(Arc::new(QueryLog::new(true))),
        )
    }

    fn sqs() -> SearchQuerySet {
        SearchQuerySet::new(connection())
    }

    #[test]
    fn test_chained_filters() {
        let sqs = sqs();
        assert_eq!(sqs.query().build_query(), "*:*");

        let sqs1 = sqs.filter(SQ::content("foo")).filter(SQ::content("bar"));
        assert_eq!(sqs1.query().build_query(), "(foo AND bar)");

        let sqs2 = sqs.filter(SQ::content("foo")).filter_or(SQ::content("bar"));
        assert_eq!(sqs2.query().build_query(), "(foo OR bar)");

        // Chaining never mutates the source set.
        assert_eq!(sqs.query().build_query(), "*:*");
    }

    #[test]
    fn test_combined_sets() {
        let sqs = sqs();
        let sqs3 = sqs
            .exclude(SQ::new("title", "moof"))
            .filter(SQ::content("foo") | SQ::content("baz"));
        let sqs4 = sqs.filter(SQ::content("bar"));

        assert_eq!(
            (&sqs3 & &sqs4).query().build_query(),
            "(NOT (title:moof) AND (foo OR baz) AND bar)"
        );
        assert_eq!(
            (&sqs3 | &sqs4).query().build_query(),
            "((NOT (title:moof) AND (foo OR baz)) OR bar)"
        );
        assert_eq!(
            (sqs3.all() & sqs4.all()).query().build_query(),
            "(NOT (title:moof) AND (foo OR baz) AND bar)"
        );
    }

    #[test]
    fn test_lookup_fragments() {
        let sqs = sqs();
        let pub_date = NaiveDate::from_ymd_opt(2009, 7, 6)
            .and_then(|d| d.and_hms_opt(1, 56, 21))
            .unwrap();

        assert_eq!(
            sqs.filter(SQ::new("pub_date__lt", pub_date)).query().build_query(),
            "pub_date:{* TO \"2009-07-06T01:56:21Z\"}"
        );
        assert_eq!(
            sqs.filter(SQ::new("title__startswith", "moo")).query().build_query(),
            "title:moo*"
        );
        assert_eq!(
            sqs.filter(SQ::new("title__contains", "oo")).query().build_query(),
            "title:*oo*"
        );
        assert_eq!(
            sqs.filter(SQ::new("views__range", vec![10, 20])).query().build_query(),
            "views:[10 TO 20]"
        );
        assert_eq!(
            sqs.filter(SQ::new("title__fuzzy", "moof")).query().build_query(),
            "title:moof~"
        );
        assert_eq!(
            sqs.filter(SQ::new("is_active", true)).query().build_query(),
            "is_active:true"
        );
        assert_eq!(
            sqs.filter(SQ::new("id__in", Vec::<i64>::new())).query().build_query(),
            "(NOT *:*)"
        );
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let sqs = sqs();
        assert_eq!(
            sqs.filter(SQ::content("hello-world")).query().build_query(),
            "hello\\-world"
        );
        assert_eq!(
            sqs.filter(SQ::new("title", "(moof)")).query().build_query(),
            "title:\\(moof\\)"
        );
        assert_eq!(
            sqs.auto_query("\"pants:rule\" -stuff").query().build_query(),
            "(pants\\:rule AND NOT (stuff))"
        );
    }

    #[test]
    fn test_models_boost_and_raw_query() {
        let sqs = sqs();
        let model = ModelType::new("core", "mockmodel");

        assert_eq!(
            sqs.models(&[model.clone()]).query().build_query(),
            "(model_type:\"core.mockmodel\")"
        );
        assert_eq!(
            sqs.filter(SQ::content("hello"))
                .boost("world", 5.0)
                .boost("earth", 0.5)
                .query()
                .build_query(),
            "hello earth^0.5 world^5"
        );
        assert_eq!(
            sqs.filter(SQ::content("ignored"))
                .raw_search("title:(foo OR bar)")
                .query()
                .build_query(),
            "title:(foo OR bar)"
        );
    }

    #[test]
    fn test_query_plans_are_independent() {
        let conn = connection();
        let mut base = SearchQuery::new(Arc::clone(&conn));
        base.add_filter(SQ::content("hello"), false);
        base.add_order_by("-pub_date");

        let narrowed = base.with(|q| q.add_narrow_query("site:1"));
        assert!(base.narrow_queries().is_empty());
        assert_eq!(narrowed.narrow_queries().len(), 1);
        assert_eq!(narrowed.order_by(), base.order_by());

        let options = narrowed.build_options(10, Some(20));
        assert_eq!(options.start_offset, 10);
        assert_eq!(options.end_offset, Some(20));
        assert_eq!(options.sort_by, vec!["-pub_date".to_string()]);
    }

    #[test]
    fn test_filter_expressions() {
        assert_eq!(
            split_expression("pub_date__lte"),
            ("pub_date".to_string(), FilterType::Lte)
        );
        assert_eq!(
            split_expression("tag__name"),
            ("tag__name".to_string(), FilterType::Exact)
        );
        assert_eq!(prepare_key("tag__name__startswith"), "tag0_0_0name__startswith");

        let formatter = LuceneFormatter::default();
        assert_eq!(
            formatter.build_query_fragment("content", FilterType::Exact, &Value::from("moof")),
            "moof"
        );
    }
}
