//! 运行时模型、过滤器准备与数据构造的测试

#[cfg(test)]
mod tests {
    use rat_lodel::datahandlers::ConstructContext;
    use rat_lodel::editorial_model::sample_model;
    use rat_lodel::leapi::query::{prepare_filters, LeGetQuery};
    use rat_lodel::{
        dummy_config, DataHandlerRegistry, DataValue, DatasourceRegistry, EditorialModel, EmClass,
        EmField, GetOptions, LeModel, LeObject, LodelError, OrderClause, QueryFilter,
        QueryOperator, Row,
    };
    use serde_json::json;
    use std::collections::HashMap;

    async fn build(em: EditorialModel) -> LeModel {
        let registry = DatasourceRegistry::new(HashMap::from([(
            "default".to_string(),
            dummy_config(false),
        )]));
        LeModel::build(em, &DataHandlerRegistry::new(), &registry)
            .await
            .expect("构建运行时模型失败")
    }

    #[tokio::test]
    async fn test_class_hierarchy() {
        let model = build(sample_model("default")).await;

        let object = model.class("Object").unwrap();
        assert!(object.is_abstract());
        let mut concrete = object.concrete_descendants().to_vec();
        concrete.sort();
        assert_eq!(concrete, vec!["Article", "Numero", "Person"]);

        let article = model.class("Article").unwrap();
        assert_eq!(article.root(), "Object");
        assert_eq!(article.ancestors(), &["Object".to_string(), "Textes".to_string()]);
        assert!(article.is_a("Textes"));
        assert!(!article.is_a("Publication"));
        assert_eq!(article.uid(), &["lodel_id".to_string()]);
        assert_eq!(article.field_owner("soustitre"), Some("Textes"));
        assert_eq!(article.subclass_identifier_field(), Some("type_id"));
        assert!(article.field("nope").is_err());

        // 子类标识决定具体类
        let textes = model.class("Textes").unwrap();
        let row: Row = [("type_id".to_string(), DataValue::from("Article"))].into_iter().collect();
        assert_eq!(model.concrete_class_of(&textes, &row).unwrap().name(), "Article");
        let row: Row = [("type_id".to_string(), DataValue::from("Numero"))].into_iter().collect();
        assert!(model.concrete_class_of(&textes, &row).is_err());
        assert!(model.concrete_class_of(&textes, &Row::new()).is_err());

        assert!(model.class("Nope").is_err());
    }

    #[tokio::test]
    async fn test_prepare_filters_is_idempotent_on_triples() {
        let model = build(sample_model("default")).await;
        let article = model.class("Article").unwrap();
        let filters = [
            QueryFilter::from("lodel_id >= 3"),
            QueryFilter::from("titre like foo*"),
            QueryFilter::from(("lodel_id", "in", DataValue::from("1, 2,3"))),
            QueryFilter::from("lodel_id >= 3"),
        ];
        let (simple, relational) = prepare_filters(&model, &article, &filters).unwrap();
        assert!(relational.is_empty());
        assert_eq!(simple.len(), 3);
        assert_eq!(simple[0].value, DataValue::Int(3));
        assert_eq!(simple[2].operator, QueryOperator::In);
        assert_eq!(
            simple[2].value,
            DataValue::Array(vec![DataValue::Int(1), DataValue::Int(2), DataValue::Int(3)])
        );

        let triples: Vec<QueryFilter> = simple.iter().map(QueryFilter::from).collect();
        let (again, _) = prepare_filters(&model, &article, &triples).unwrap();
        assert_eq!(again, simple);
    }

    #[tokio::test]
    async fn test_invalid_filters_are_aggregated() {
        let model = build(sample_model("default")).await;
        let article = model.class("Article").unwrap();
        let err = prepare_filters(
            &model,
            &article,
            &[
                QueryFilter::from("nosuch = 1"),
                QueryFilter::from("titre ~ 3"),
                QueryFilter::from("titre.foo = 3"),
                QueryFilter::from("lodel_id = abc"),
                QueryFilter::from("titre = ok"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LodelError::DataCheckErrors { .. }));
        assert_eq!(err.errors().len(), 4);
        assert!(err.has_error_for("nosuch = 1"));
        assert!(err.has_error_for("titre ~ 3"));
        assert!(err.has_error_for("titre.foo = 3"));
        assert!(err.has_error_for("lodel_id = abc"));
    }

    #[tokio::test]
    async fn test_relational_filter_preparation() {
        let model = build(sample_model("default")).await;
        let article = model.class("Article").unwrap();
        let (simple, relational) =
            prepare_filters(&model, &article, &[QueryFilter::from("author.lastname = Doe")]).unwrap();
        assert!(simple.is_empty());
        assert_eq!(relational.len(), 1);
        assert_eq!(relational[0].field, "author");
        assert_eq!(
            relational[0].references,
            vec![("Person".to_string(), "lastname".to_string())]
        );

        // 未给出引用字段时使用被引用类的标识字段
        let (_, relational) =
            prepare_filters(&model, &article, &[QueryFilter::from("author = 3")]).unwrap();
        assert_eq!(relational[0].references[0].1, "lodel_id");
        assert_eq!(relational[0].value, DataValue::Int(3));
    }

    #[tokio::test]
    async fn test_heterogeneous_uid_names_are_rejected() {
        let em = EditorialModel::new("hetero")
            .with_class(
                EmClass::new("A")
                    .datasource("default")
                    .field(EmField::new("id_a", "uniqid")),
            )
            .with_class(
                EmClass::new("B")
                    .datasource("default")
                    .field(EmField::new("id_b", "uniqid")),
            )
            .with_class(
                EmClass::new("C")
                    .datasource("default")
                    .field(EmField::new("lodel_id", "uniqid"))
                    .field(EmField::new("target", "link").with_option("allowed_classes", json!(["A", "B"]))),
            );
        let model = build(em).await;
        let c = model.class("C").unwrap();

        let err = prepare_filters(&model, &c, &[QueryFilter::from("target = 3")]).unwrap_err();
        assert!(err.has_error_for("target = 3"));

        // 显式指定字段时只保留拥有该字段的类
        let (_, relational) =
            prepare_filters(&model, &c, &[QueryFilter::from("target.id_b = 3")]).unwrap();
        assert_eq!(relational[0].references, vec![("B".to_string(), "id_b".to_string())]);
    }

    #[tokio::test]
    async fn test_circular_construction_is_detected() {
        let em = EditorialModel::new("circular").with_class(
            EmClass::new("Loop")
                .datasource("default")
                .field(EmField::new("lodel_id", "uniqid"))
                .field(
                    EmField::new("a", "format_string")
                        .with_option("format_string", json!("<%s>"))
                        .with_option("field_list", json!(["b"])),
                )
                .field(
                    EmField::new("b", "format_string")
                        .with_option("format_string", json!("[%s]"))
                        .with_option("field_list", json!(["a"])),
                ),
        );
        let model = build(em).await;
        let class = model.class("Loop").unwrap();
        let err = class
            .construct_datas(&Row::new(), &ConstructContext::creation(Some(DataValue::Int(1))))
            .unwrap_err();
        assert!(matches!(err, LodelError::Runtime { .. }));
    }

    #[tokio::test]
    async fn test_get_query_options_are_checked() {
        let model = build(sample_model("default")).await;
        let person = model.class("Person").unwrap();

        assert!(LeGetQuery::new(&model, person.clone(), &[], GetOptions::default().limit(0)).is_err());
        let err = LeGetQuery::new(
            &model,
            person.clone(),
            &[],
            GetOptions::default().order(OrderClause::asc("nope")),
        )
        .unwrap_err();
        assert!(err.has_error_for("nope"));

        let query = LeGetQuery::new(
            &model,
            person,
            &[],
            GetOptions::default().fields(&["lastname", "lastname", "firstname"]),
        )
        .unwrap();
        assert_eq!(query.field_list(), &["lastname".to_string(), "firstname".to_string()]);
    }

    #[tokio::test]
    async fn test_instance_creation_checks() {
        let model = build(sample_model("default")).await;

        assert!(LeObject::new(&model, "Textes", Row::new()).is_err());

        let err = LeObject::new(
            &model,
            "Person",
            [("fullname".to_string(), DataValue::from("x"))].into_iter().collect(),
        )
        .unwrap_err();
        assert!(err.has_error_for("lodel_id"));
        assert!(err.has_error_for("fullname"));

        let mut person = LeObject::new(
            &model,
            "Person",
            [("lodel_id".to_string(), DataValue::Int(9))].into_iter().collect(),
        )
        .unwrap();
        assert!(!person.is_initialized());
        person.set_data("lastname", DataValue::from("Doe")).unwrap();
        person.set_data("firstname", DataValue::from("John")).unwrap();
        person.set_data("linked_texts", DataValue::Null).unwrap();
        assert!(person.is_initialized());
        assert!(person.set_data("type_id", DataValue::from("Person")).is_err());
        assert_eq!(person.uid(), vec![DataValue::Int(9)]);
    }
}
