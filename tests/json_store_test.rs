//! JSON文件数据源上的端到端测试：插入、获取、更新、删除以及反向引用维护

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rat_lodel::adapter::JsonFileDatasource;
    use rat_lodel::editorial_model::sample_model;
    use rat_lodel::leapi::query::{LeFilteredQuery, RelationalFilter, SimpleFilter};
    use rat_lodel::{
        DataHandlerRegistry, DataValue, Datasource, DatasourceRegistry, GetOptions, LeClass,
        LeModel, LeObject, LodelError, LodelResult, OrderClause, QueryFilter, Row, SelectQuery,
    };
    use std::sync::Arc;

    /// 与SQL数据源相同，按现有最大标识加一分配
    struct MaxPlusOneStore {
        inner: JsonFileDatasource,
    }

    #[async_trait]
    impl Datasource for MaxPlusOneStore {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<Vec<Row>> {
            self.inner.select(model, class, query).await
        }

        async fn insert(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
            self.inner.insert(model, class, datas).await
        }

        async fn update(
            &self,
            model: &LeModel,
            class: &LeClass,
            filters: &[SimpleFilter],
            relational_filters: &[RelationalFilter],
            datas: &Row,
        ) -> LodelResult<u64> {
            self.inner.update(model, class, filters, relational_filters, datas).await
        }

        async fn delete(
            &self,
            model: &LeModel,
            class: &LeClass,
            filters: &[SimpleFilter],
            relational_filters: &[RelationalFilter],
        ) -> LodelResult<u64> {
            self.inner.delete(model, class, filters, relational_filters).await
        }

        async fn new_numeric_id(&self, model: &LeModel, class: &LeClass) -> LodelResult<i64> {
            let root = model.class(class.root())?;
            let rows = self.inner.select(model, &root, &SelectQuery::default()).await?;
            let max = rows
                .iter()
                .filter_map(|row| match row.get("lodel_id") {
                    Some(DataValue::Int(id)) => Some(*id),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Ok(max + 1)
        }
    }

    fn row(pairs: &[(&str, DataValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    async fn model_with(read_only: bool) -> LeModel {
        let registry = DatasourceRegistry::default();
        registry.register(
            "default",
            Arc::new(JsonFileDatasource::in_memory("default")),
            read_only,
        );
        LeModel::build(sample_model("default"), &DataHandlerRegistry::new(), &registry)
            .await
            .expect("构建运行时模型失败")
    }

    async fn insert_person(model: &LeModel, firstname: &str, lastname: &str) -> DataValue {
        LeObject::insert(
            model,
            "Person",
            row(&[
                ("firstname", DataValue::from(firstname)),
                ("lastname", DataValue::from(lastname)),
            ]),
        )
        .await
        .expect("插入Person失败")
    }

    async fn linked_texts(model: &LeModel, person: &DataValue) -> Vec<DataValue> {
        let object = LeObject::get_from_uid(model, "Person", person.clone())
            .await
            .unwrap()
            .expect("Person不存在");
        match object.data("linked_texts") {
            Ok(DataValue::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_constructs_internal_fields() {
        let model = model_with(false).await;
        let uid = insert_person(&model, "John", "Doe").await;
        assert_eq!(uid, DataValue::Int(1));

        let person = LeObject::get_from_uid(&model, "Person", 1_i64)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(person.class().name(), "Person");
        assert_eq!(person.data("fullname").unwrap(), &DataValue::from("John Doe"));
        assert_eq!(person.data("type_id").unwrap(), &DataValue::from("Person"));
        assert_eq!(person.data("class_id").unwrap(), &DataValue::from("Person"));
        assert!(matches!(person.data("date_create").unwrap(), DataValue::DateTime(_)));

        let second = insert_person(&model, "Jane", "Roe").await;
        assert_eq!(second, DataValue::Int(2));
        println!("✅ 插入构造内部字段测试通过");
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_data() {
        let model = model_with(false).await;

        let err = LeObject::insert(&model, "Person", row(&[("firstname", DataValue::from("John"))]))
            .await
            .unwrap_err();
        assert!(err.has_error_for("lastname"));

        let err = LeObject::insert(
            &model,
            "Person",
            row(&[
                ("lastname", DataValue::from("Doe")),
                ("fullname", DataValue::from("forced")),
                ("nosuchfield", DataValue::Int(1)),
            ]),
        )
        .await
        .unwrap_err();
        assert!(err.has_error_for("fullname"));
        assert!(err.has_error_for("nosuchfield"));

        // 抽象类不能插入
        assert!(LeObject::insert(&model, "Textes", Row::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_get_on_abstract_class_returns_concrete_objects() {
        let model = model_with(false).await;
        let author = insert_person(&model, "John", "Doe").await;
        for titre in ["foo", "foobar", "bar"] {
            LeObject::insert(
                &model,
                "Article",
                row(&[("titre", DataValue::from(titre)), ("author", author.clone())]),
            )
            .await
            .unwrap();
        }
        LeObject::insert(&model, "Numero", row(&[("titre", DataValue::from("foo numero"))]))
            .await
            .unwrap();

        let textes = LeObject::get(
            &model,
            "Textes",
            &[QueryFilter::from("titre like foo*")],
            GetOptions::default().order(OrderClause::desc("titre")),
        )
        .await
        .unwrap();
        let titres: Vec<_> = textes.iter().map(|o| o.data("titre").unwrap().clone()).collect();
        assert_eq!(titres, vec![DataValue::from("foobar"), DataValue::from("foo")]);
        assert!(textes.iter().all(|o| o.class().name() == "Article"));

        let all = LeObject::get(
            &model,
            "Object",
            &[],
            GetOptions::default()
                .order(OrderClause::asc("lodel_id"))
                .offset(1)
                .limit(2),
        )
        .await
        .unwrap();
        let ids: Vec<_> = all.iter().map(|o| o.uid()[0].clone()).collect();
        assert_eq!(ids, vec![DataValue::Int(2), DataValue::Int(3)]);
    }

    #[tokio::test]
    async fn test_field_list_always_contains_identifiers() {
        let model = model_with(false).await;
        insert_person(&model, "John", "Doe").await;

        let people = LeObject::get(&model, "Object", &[], GetOptions::default().fields(&["date_create"]))
            .await
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].class().name(), "Person");
        assert!(people[0].data("lodel_id").is_ok());
        assert!(people[0].data("firstname").is_err());

        let err = LeObject::get(&model, "Person", &[], GetOptions::default().fields(&["nope"]))
            .await
            .unwrap_err();
        assert!(err.has_error_for("nope"));
    }

    #[tokio::test]
    async fn test_set_data_on_initialized_instance_rechecks_everything() {
        let model = model_with(false).await;
        let uid = insert_person(&model, "John", "Doe").await;
        let mut person = LeObject::get_from_uid(&model, "Person", uid)
            .await
            .unwrap()
            .unwrap();
        assert!(person.is_initialized());

        // 整个实例重新构造，格式化字段随之更新
        person.set_data("firstname", DataValue::from("Jane")).unwrap();
        assert_eq!(person.data("fullname").unwrap(), &DataValue::from("Jane Doe"));
        assert_eq!(person.data("type_id").unwrap(), &DataValue::from("Person"));

        let err = person.set_data("lastname", DataValue::Null).unwrap_err();
        assert!(matches!(err, LodelError::DataCheckErrors { .. }));
        assert!(err.has_error_for("lastname"));
        // 失败时实例数据保持不变
        assert_eq!(person.data("lastname").unwrap(), &DataValue::from("Doe"));
        assert_eq!(person.data("fullname").unwrap(), &DataValue::from("Jane Doe"));

        assert!(person.set_data("fullname", DataValue::from("x")).is_err());
        assert!(person.set_data("nosuchfield", DataValue::from("x")).is_err());
    }

    #[tokio::test]
    async fn test_relational_filter() {
        let model = model_with(false).await;
        let doe = insert_person(&model, "John", "Doe").await;
        let roe = insert_person(&model, "Jane", "Roe").await;
        for (titre, author) in [("a", &doe), ("b", &roe), ("c", &doe)] {
            LeObject::insert(
                &model,
                "Article",
                row(&[("titre", DataValue::from(titre)), ("author", author.clone())]),
            )
            .await
            .unwrap();
        }

        let by_doe = LeObject::get(
            &model,
            "Article",
            &[QueryFilter::from("author.lastname = Doe")],
            GetOptions::default().order(OrderClause::asc("titre")),
        )
        .await
        .unwrap();
        let titres: Vec<_> = by_doe.iter().map(|o| o.data("titre").unwrap().clone()).collect();
        assert_eq!(titres, vec![DataValue::from("a"), DataValue::from("c")]);

        // 不带引用字段时按标识比较
        let by_uid = LeObject::get(&model, "Article", &[QueryFilter::from(("author", "=", roe))], GetOptions::default())
            .await
            .unwrap();
        assert_eq!(by_uid.len(), 1);
    }

    #[tokio::test]
    async fn test_back_references_follow_writes() {
        let model = model_with(false).await;
        let doe = insert_person(&model, "John", "Doe").await;
        let roe = insert_person(&model, "Jane", "Roe").await;

        let article = LeObject::insert(
            &model,
            "Article",
            row(&[("titre", DataValue::from("Texte")), ("author", doe.clone())]),
        )
        .await
        .unwrap();
        assert_eq!(linked_texts(&model, &doe).await, vec![article.clone()]);

        let mut object = LeObject::get_from_uid(&model, "Article", article.clone())
            .await
            .unwrap()
            .unwrap();
        let updated = object
            .update(Some(row(&[("author", roe.clone())])))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert!(linked_texts(&model, &doe).await.is_empty());
        assert_eq!(linked_texts(&model, &roe).await, vec![article.clone()]);

        assert_eq!(object.delete().await.unwrap(), 1);
        assert!(linked_texts(&model, &roe).await.is_empty());
        assert!(LeObject::get_from_uid(&model, "Article", article)
            .await
            .unwrap()
            .is_none());
        println!("✅ 反向引用维护测试通过");
    }

    #[tokio::test]
    async fn test_bundle_update_and_delete() {
        let model = model_with(false).await;
        insert_person(&model, "John", "Doe").await;
        insert_person(&model, "Jane", "Doe").await;
        insert_person(&model, "Max", "Roe").await;

        let updated = LeObject::update_bundle(
            &model,
            "Person",
            &[QueryFilter::from("lastname = Doe")],
            row(&[("firstname", DataValue::from("Anon"))]),
        )
        .await
        .unwrap();
        assert_eq!(updated, 2);

        let anon = LeObject::get(&model, "Person", &[QueryFilter::from("firstname = Anon")], GetOptions::default())
            .await
            .unwrap();
        assert_eq!(anon.len(), 2);
        // 格式化字段随依赖字段重新构造
        assert!(anon
            .iter()
            .all(|o| o.data("fullname").unwrap() == &DataValue::from("Anon Doe")));

        let deleted = LeObject::delete_bundle(&model, "Object", &[QueryFilter::from("lodel_id in 1,3")])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        let left = LeObject::get(&model, "Person", &[], GetOptions::default()).await.unwrap();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn test_cross_datasource_filter_becomes_subquery() {
        let mut em = sample_model("default");
        if let Some(person) = em.classes.iter_mut().find(|c| c.name == "Person") {
            person.datasource = Some("people".to_string());
        }
        let registry = DatasourceRegistry::default();
        registry.register("default", Arc::new(JsonFileDatasource::in_memory("default")), false);
        registry.register("people", Arc::new(JsonFileDatasource::in_memory("people")), false);
        let model = LeModel::build(em, &DataHandlerRegistry::new(), &registry)
            .await
            .unwrap();
        assert_eq!(model.class("Person").unwrap().datasource_name(), "people");

        let doe = insert_person(&model, "John", "Doe").await;
        LeObject::insert(
            &model,
            "Article",
            row(&[("titre", DataValue::from("a")), ("author", doe)]),
        )
        .await
        .unwrap();

        let mut query = LeFilteredQuery::new(&model, model.class("Article").unwrap());
        query
            .set_query_filter(&[QueryFilter::from("author.lastname = Doe")])
            .unwrap();
        assert_eq!(query.subquery_count(), 1);
        assert!(query.relational_filters().is_empty());

        let found = LeObject::get(
            &model,
            "Article",
            &[QueryFilter::from("author.lastname = Doe")],
            GetOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        let none = LeObject::get(
            &model,
            "Article",
            &[QueryFilter::from("author.lastname = Roe")],
            GetOptions::default(),
        )
        .await
        .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_insert_multi_assigns_distinct_uids() {
        let registry = DatasourceRegistry::default();
        registry.register(
            "default",
            Arc::new(MaxPlusOneStore {
                inner: JsonFileDatasource::in_memory("default"),
            }),
            false,
        );
        let model = LeModel::build(sample_model("default"), &DataHandlerRegistry::new(), &registry)
            .await
            .unwrap();
        insert_person(&model, "John", "Doe").await;

        let uids = LeObject::insert_multi(
            &model,
            "Person",
            vec![
                row(&[("lastname", DataValue::from("Roe"))]),
                row(&[("lastname", DataValue::from("Poe"))]),
                row(&[("lastname", DataValue::from("Zoe"))]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(uids, vec![DataValue::Int(2), DataValue::Int(3), DataValue::Int(4)]);
        for uid in &uids {
            assert!(LeObject::get_from_uid(&model, "Person", uid.clone())
                .await
                .unwrap()
                .is_some());
        }

        // 任意一行无效时整批不写入
        let err = LeObject::insert_multi(
            &model,
            "Person",
            vec![row(&[("lastname", DataValue::from("Ok"))]), row(&[("firstname", DataValue::from("x"))])],
        )
        .await
        .unwrap_err();
        assert!(err.has_error_for("1"));
        let people = LeObject::get(&model, "Person", &[], GetOptions::default()).await.unwrap();
        assert_eq!(people.len(), 4);
    }

    #[tokio::test]
    async fn test_read_only_datasource_rejects_writes() {
        let model = model_with(true).await;
        let err = LeObject::insert(&model, "Person", row(&[("lastname", DataValue::from("Doe"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, LodelError::ReadOnlyDatasource { .. }));

        // 读取仍然可用
        let people = LeObject::get(&model, "Person", &[], GetOptions::default()).await.unwrap();
        assert!(people.is_empty());
    }
}
