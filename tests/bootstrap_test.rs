//! 从配置文件启动：加载编辑模型、创建数据源并在重新启动后读回持久化的数据

#[cfg(test)]
mod tests {
    use rat_lodel::editorial_model::sample_model;
    use rat_lodel::{
        bootstrap, json_file_config, AppConfig, DataValue, GetOptions, LeObject, LodelConfig,
        LogLevel, LoggingConfig, QueryFilter, Row,
    };
    use std::path::{Path, PathBuf};

    fn config_in(dir: &Path) -> LodelConfig {
        let em_path = dir.join("em.toml");
        sample_model("default").save_to_file(&em_path).unwrap();
        let store = dir.join("store.json").to_string_lossy().to_string();

        LodelConfig::builder()
            .app(AppConfig::builder().name("lodel-test").debug(true).build().unwrap())
            .logging(
                LoggingConfig::builder()
                    .level(LogLevel::Debug)
                    .console(true)
                    .file_path(None::<PathBuf>)
                    .max_file_size(1024 * 1024)
                    .max_files(1)
                    .build()
                    .unwrap(),
            )
            .editorial_model(em_path)
            .add_datasource("default", json_file_config(Some(store), false).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_and_reload() {
        rat_lodel::init();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("lodel.toml");
        config_in(dir.path()).save_to_file(&config_path).unwrap();

        let config = LodelConfig::from_file(&config_path).unwrap();
        let model = bootstrap(&config).await.unwrap();
        assert_eq!(model.name(), "sample");
        assert_eq!(model.classes().count(), 6);

        let datas: Row = [("lastname".to_string(), DataValue::from("Doe"))].into_iter().collect();
        let uid = LeObject::insert(&model, "Person", datas).await.unwrap();
        assert!(dir.path().join("store.json").exists());
        drop(model);

        // 重新启动后从文件加载
        let model = bootstrap(&config).await.unwrap();
        let people = LeObject::get(
            &model,
            "Person",
            &[QueryFilter::from("lastname = Doe")],
            GetOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].uid(), vec![uid]);

        // 标识继续递增
        let datas: Row = [("lastname".to_string(), DataValue::from("Roe"))].into_iter().collect();
        assert_eq!(
            LeObject::insert(&model, "Person", datas).await.unwrap(),
            DataValue::Int(2)
        );
    }

    #[tokio::test]
    async fn test_bootstrap_reports_missing_datasource() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.datasources.clear();
        assert!(bootstrap(&config).await.is_err());

        let mut config = config_in(dir.path());
        config.editorial_model = dir.path().join("missing.toml");
        assert!(bootstrap(&config).await.is_err());
    }

    #[test]
    fn test_library_info() {
        assert!(rat_lodel::get_info().starts_with("rat_lodel v"));
    }
}
