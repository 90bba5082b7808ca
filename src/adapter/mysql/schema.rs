//! MySQL表结构
//!
//! 表布局：
//! - 层级根类声明的字段存放在根类共享表中（如 `object`）
//! - 其他类声明的字段存放在 `class_<类名>` 表中，以标识列关联
//! - 多语言字段存放在附属表 `<所属表>_<字段>` 中，每种语言一行
//! - 多值引用字段存放在共享的 `relation` 表中，`nature` 为 `<类>.<字段>`
//! - `map` 类型的引用以JSON文本存放在所属表的列中

use crate::datahandlers::{BaseType, DataHandler};
use crate::error::LodelResult;
use crate::leapi::{LeClass, LeModel};
use crate::security::IdentifierValidator;
use crate::types::DatasourceKind;
use std::sync::Arc;

/// 多值引用关系表
pub const RELATION_TABLE: &str = "relation";

/// 字段的存储位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStorage {
    /// 普通列
    Column { table: String },
    /// 以JSON文本存放的列
    Json { table: String },
    /// 多语言附属表
    MlString { table: String },
    /// 关系表中 `nature` 为该值的行
    Relation { nature: String },
}

/// MySQL表结构描述
pub struct MysqlSchema {
    validator: IdentifierValidator,
}

impl Default for MysqlSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl MysqlSchema {
    pub fn new() -> Self {
        Self {
            validator: IdentifierValidator::new(DatasourceKind::MySQL),
        }
    }

    /// 验证并加上反引号
    pub fn quote(&self, identifier: &str) -> LodelResult<String> {
        self.validator.quote(identifier)
    }

    /// `table`.`column`
    pub fn qualified(&self, table: &str, column: &str) -> LodelResult<String> {
        Ok(format!("{}.{}", self.quote(table)?, self.quote(column)?))
    }

    pub fn root_table(class: &LeClass) -> String {
        class.root().to_lowercase()
    }

    pub fn class_table(class_name: &str) -> String {
        format!("class_{}", class_name.to_lowercase())
    }

    /// 声明字段的类所对应的表
    pub fn owner_table(class: &LeClass, owner: &str) -> String {
        if owner == class.root() {
            Self::root_table(class)
        } else {
            Self::class_table(owner)
        }
    }

    /// 字段的存储位置
    pub fn storage(class: &LeClass, field: &str) -> LodelResult<FieldStorage> {
        let handler = class.field(field)?;
        let owner = class.field_owner(field).unwrap_or(class.name());
        let table = Self::owner_table(class, owner);
        Ok(match handler.base_type() {
            BaseType::MlString => FieldStorage::MlString {
                table: format!("{}_{}", table, field),
            },
            BaseType::MultipleRef if handler.name() == "map" => FieldStorage::Json { table },
            BaseType::MultipleRef => FieldStorage::Relation {
                nature: format!("{}.{}", owner, field),
            },
            _ => FieldStorage::Column { table },
        })
    }

    /// 类 `owner` 在自身表中声明的列字段（不含标识字段）
    pub fn declared_columns<'a>(class: &'a LeClass, owner: &str) -> Vec<(&'a String, &'a Arc<dyn DataHandler>)> {
        class
            .fields()
            .filter(|(name, handler)| {
                class.field_owner(name) == Some(owner)
                    && !class.uid().contains(name)
                    && handler.base_type() != BaseType::MlString
                    && !(handler.base_type() == BaseType::MultipleRef && handler.name() != "map")
            })
            .collect()
    }

    /// 具体类的数据所在的列表，根表在前
    ///
    /// 根表始终存在，其他类只有声明了列字段时才有表
    pub fn tables_of(class: &LeClass) -> Vec<(String, String)> {
        let mut tables = vec![(class.root().to_string(), Self::root_table(class))];
        let mut owners: Vec<&str> = class.ancestors().iter().map(|s| s.as_str()).collect();
        owners.push(class.name());
        for owner in owners {
            if owner == class.root() {
                continue;
            }
            if !Self::declared_columns(class, owner).is_empty() {
                tables.push((owner.to_string(), Self::class_table(owner)));
            }
        }
        tables
    }

    fn column_type(handler: &dyn DataHandler) -> String {
        match handler.base_type() {
            BaseType::Varchar(len) => format!("VARCHAR({})", len),
            BaseType::Text => "TEXT".to_string(),
            BaseType::Integer => "BIGINT".to_string(),
            BaseType::Decimal => "DOUBLE".to_string(),
            BaseType::Boolean => "BOOLEAN".to_string(),
            BaseType::DateTime => "DATETIME".to_string(),
            BaseType::SingleRef => "BIGINT".to_string(),
            BaseType::MultipleRef | BaseType::MlString => "TEXT".to_string(),
        }
    }

    fn column_definition(&self, name: &str, handler: &dyn DataHandler, force_not_null: bool) -> LodelResult<String> {
        let null_constraint = if force_not_null || !handler.is_nullable() {
            "NOT NULL"
        } else {
            "NULL"
        };
        Ok(format!(
            "{} {} {}",
            self.quote(name)?,
            Self::column_type(handler),
            null_constraint
        ))
    }

    fn uid_definitions(&self, class: &LeClass) -> LodelResult<Vec<String>> {
        class
            .uid()
            .iter()
            .map(|uid| self.column_definition(uid, class.field(uid)?.as_ref(), true))
            .collect()
    }

    fn primary_key(&self, columns: &[String]) -> LodelResult<String> {
        let quoted = columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<LodelResult<Vec<_>>>()?;
        Ok(format!("PRIMARY KEY ({})", quoted.join(", ")))
    }

    /// 生成数据源中全部表的建表语句与修改时间触发器
    ///
    /// 顺序：关系表、数据表、多语言附属表、触发器
    pub fn create_statements(&self, model: &LeModel, datasource: &str) -> LodelResult<Vec<String>> {
        let mut created: Vec<String> = Vec::new();
        let mut tables = Vec::new();
        let mut satellites = Vec::new();
        let mut triggers = Vec::new();
        let mut needs_relation = false;

        for class in model.classes().filter(|c| c.datasource_name() == datasource) {
            for (owner, table) in Self::tables_of(class) {
                if created.contains(&table) {
                    continue;
                }
                let mut columns = self.uid_definitions(class)?;
                for (name, handler) in Self::declared_columns(class, &owner) {
                    columns.push(self.column_definition(name, handler.as_ref(), false)?);
                }
                columns.push(self.primary_key(class.uid())?);
                tables.push(format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    self.quote(&table)?,
                    columns.join(", ")
                ));
                created.push(table);
            }

            for (name, handler) in class.fields() {
                match Self::storage(class, name)? {
                    FieldStorage::Relation { .. } => needs_relation = true,
                    FieldStorage::MlString { table } if !created.contains(&table) => {
                        let mut columns = self.uid_definitions(class)?;
                        columns.push(format!("{} VARCHAR(8) NOT NULL", self.quote("lang")?));
                        columns.push(format!("{} TEXT NULL", self.quote("value")?));
                        let mut key: Vec<String> = class.uid().to_vec();
                        key.push("lang".to_string());
                        columns.push(self.primary_key(&key)?);
                        satellites.push(format!(
                            "CREATE TABLE IF NOT EXISTS {} ({})",
                            self.quote(&table)?,
                            columns.join(", ")
                        ));
                        created.push(table);
                    }
                    _ => {}
                }

                if handler.base_type() == BaseType::DateTime
                    && handler.options().get_bool("now_on_update") == Some(true)
                {
                    let owner = class.field_owner(name).unwrap_or(class.name());
                    let table = Self::owner_table(class, owner);
                    let trigger = format!("{}_{}_update", table, name);
                    if !created.contains(&trigger) {
                        triggers.push(format!(
                            "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW SET NEW.{} = NOW()",
                            self.quote(&trigger)?,
                            self.quote(&table)?,
                            self.quote(name)?
                        ));
                        created.push(trigger);
                    }
                }
            }
        }

        let mut statements = Vec::new();
        if needs_relation {
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} ({} BIGINT NOT NULL AUTO_INCREMENT, {} BIGINT NOT NULL, {} BIGINT NOT NULL, {} VARCHAR(255) NOT NULL, {} INT NOT NULL DEFAULT 0, PRIMARY KEY ({}))",
                self.quote(RELATION_TABLE)?,
                self.quote("id_relation")?,
                self.quote("id_superior")?,
                self.quote("id_subordinate")?,
                self.quote("nature")?,
                self.quote("rank")?,
                self.quote("id_relation")?
            ));
        }
        statements.extend(tables);
        statements.extend(satellites);
        statements.extend(triggers);
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DatasourceRegistry;
    use crate::config::dummy_config;
    use crate::datahandlers::DataHandlerRegistry;
    use crate::editorial_model::sample_model;
    use std::collections::HashMap;

    async fn model() -> LeModel {
        let registry = DatasourceRegistry::new(HashMap::from([(
            "default".to_string(),
            dummy_config(false),
        )]));
        LeModel::build(sample_model("default"), &DataHandlerRegistry::new(), &registry)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_field_storage_layout() {
        let model = model().await;
        let article = model.class("Article").unwrap();
        let tables: Vec<_> = MysqlSchema::tables_of(&article)
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        assert_eq!(tables, vec!["object", "class_textes", "class_article"]);
        assert_eq!(
            MysqlSchema::storage(&article, "resume").unwrap(),
            FieldStorage::MlString { table: "class_textes_resume".to_string() }
        );
        assert_eq!(
            MysqlSchema::storage(&article, "lodel_id").unwrap(),
            FieldStorage::Column { table: "object".to_string() }
        );

        // 多值引用不占用类表
        let numero = model.class("Numero").unwrap();
        let tables: Vec<_> = MysqlSchema::tables_of(&numero)
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        assert_eq!(tables, vec!["object", "class_publication"]);
        assert_eq!(
            MysqlSchema::storage(&numero, "articles").unwrap(),
            FieldStorage::Relation { nature: "Numero.articles".to_string() }
        );
    }

    #[tokio::test]
    async fn test_create_statements() {
        let model = model().await;
        let statements = MysqlSchema::new().create_statements(&model, "default").unwrap();

        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS `relation`"));
        let object_tables = statements
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE IF NOT EXISTS `object` "))
            .count();
        assert_eq!(object_tables, 1);
        assert!(statements
            .iter()
            .any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS `class_textes_resume`")
                && s.contains("PRIMARY KEY (`lodel_id`, `lang`)")));
        assert!(!statements.iter().any(|s| s.starts_with("CREATE TRIGGER")));

        assert!(MysqlSchema::new().create_statements(&model, "other").unwrap().is_empty());
    }
}
