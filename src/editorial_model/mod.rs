//! 编辑模型
//!
//! 描述内容类型的元数据：类的继承层级、抽象标记、数据源分配以及字段声明。
//! 编辑模型可以从 TOML 或 JSON 文件加载，加载后需经过 [`EditorialModel::validate`]
//! 校验才能用于构建运行时模型。

use crate::datahandlers::DataHandlerRegistry;
use crate::error::{LodelError, LodelResult};
use crate::types::MlString;
use rat_logger::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::path::Path;

/// 字段声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmField {
    pub name: String,
    /// 数据处理器名称
    pub data_handler: String,
    /// 数据处理器选项
    #[serde(default)]
    pub options: Map<String, JsonValue>,
    #[serde(default)]
    pub display_name: MlString,
    #[serde(default)]
    pub help_text: MlString,
}

impl EmField {
    pub fn new(name: &str, data_handler: &str) -> Self {
        Self {
            name: name.to_string(),
            data_handler: data_handler.to_string(),
            options: Map::new(),
            display_name: MlString::new(),
            help_text: MlString::new(),
        }
    }

    /// 设置一个处理器选项
    pub fn with_option(mut self, key: &str, value: JsonValue) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }
}

/// 类声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmClass {
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// 父类名称
    #[serde(default)]
    pub parents: Vec<String>,
    /// 数据源名称，未设置时继承第一个父类的数据源
    #[serde(default)]
    pub datasource: Option<String>,
    #[serde(default)]
    pub display_name: MlString,
    #[serde(default)]
    pub help_text: MlString,
    #[serde(default)]
    pub fields: Vec<EmField>,
}

impl EmClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_abstract: false,
            parents: Vec::new(),
            datasource: None,
            display_name: MlString::new(),
            help_text: MlString::new(),
            fields: Vec::new(),
        }
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parents.push(parent.to_string());
        self
    }

    pub fn datasource(mut self, datasource: &str) -> Self {
        self.datasource = Some(datasource.to_string());
        self
    }

    pub fn field(mut self, field: EmField) -> Self {
        self.fields.push(field);
        self
    }
}

/// 编辑模型
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorialModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub classes: Vec<EmClass>,
}

impl EditorialModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: EmClass) -> Self {
        self.classes.push(class);
        self
    }

    /// 从文件加载，扩展名为 `toml` 时按 TOML 解析，否则按 JSON 解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> LodelResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let model = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        info!("从文件加载编辑模型: {:?} ({} 个类)", path, model.classes.len());
        Ok(model)
    }

    pub fn from_toml_str(content: &str) -> LodelResult<Self> {
        toml::from_str(content)
            .map_err(|e| crate::lodel_error!(model, format!("解析TOML编辑模型失败: {}", e)))
    }

    pub fn from_json_str(content: &str) -> LodelResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| crate::lodel_error!(model, format!("解析JSON编辑模型失败: {}", e)))
    }

    /// 保存到文件，格式规则与 [`EditorialModel::from_file`] 相同
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LodelResult<()> {
        let path = path.as_ref();
        let content = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self)
                .map_err(|e| crate::lodel_error!(model, format!("序列化TOML编辑模型失败: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<&EmClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> LodelResult<&EmClass> {
        self.class(name)
            .ok_or_else(|| crate::lodel_error!(model, format!("类 {} 不存在", name)))
    }

    /// 祖先类列表，根类在前，不含自身
    ///
    /// 多继承时按父类声明顺序深度优先展开，重复出现的祖先只保留第一次
    pub fn ancestors(&self, name: &str) -> LodelResult<Vec<&EmClass>> {
        let mut result: Vec<&EmClass> = Vec::new();
        let mut visiting = HashSet::new();
        self.collect_ancestors(name, &mut result, &mut visiting)?;
        Ok(result)
    }

    fn collect_ancestors<'a>(
        &'a self,
        name: &str,
        result: &mut Vec<&'a EmClass>,
        visiting: &mut HashSet<String>,
    ) -> LodelResult<()> {
        if !visiting.insert(name.to_string()) {
            return Err(crate::lodel_error!(
                model,
                format!("类 {} 的继承关系存在循环", name)
            ));
        }
        let class = self.require(name)?;
        for parent in &class.parents {
            self.collect_ancestors(parent, result, visiting)?;
            let parent_class = self.require(parent)?;
            if !result.iter().any(|c| c.name == parent_class.name) {
                result.push(parent_class);
            }
        }
        visiting.remove(name);
        Ok(())
    }

    /// 类所在层级的根类名称
    pub fn root_of(&self, name: &str) -> LodelResult<String> {
        Ok(self
            .ancestors(name)?
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| name.to_string()))
    }

    /// 根类下第一层的祖先，根类自身返回根类名
    pub fn class_level(&self, name: &str) -> LodelResult<String> {
        let chain = self.ancestors(name)?;
        Ok(match chain.len() {
            0 => name.to_string(),
            1 => name.to_string(),
            _ => chain[1].name.clone(),
        })
    }

    /// 数据源名称，沿第一个父类向上继承
    pub fn datasource_of(&self, name: &str) -> LodelResult<Option<String>> {
        let mut current = self.require(name)?;
        let mut seen = HashSet::new();
        loop {
            if let Some(ds) = &current.datasource {
                return Ok(Some(ds.clone()));
            }
            if !seen.insert(current.name.clone()) {
                return Ok(None);
            }
            match current.parents.first() {
                Some(parent) => current = self.require(parent)?,
                None => return Ok(None),
            }
        }
    }

    /// 类的全部字段（含继承），根类字段在前，子类同名字段覆盖父类
    ///
    /// 返回 (声明类名, 字段)
    pub fn all_fields(&self, name: &str) -> LodelResult<Vec<(String, &EmField)>> {
        let mut chain = self.ancestors(name)?;
        chain.push(self.require(name)?);

        let mut result: Vec<(String, &EmField)> = Vec::new();
        for class in chain {
            for field in &class.fields {
                match result.iter_mut().find(|(_, f)| f.name == field.name) {
                    Some(slot) => *slot = (class.name.clone(), field),
                    None => result.push((class.name.clone(), field)),
                }
            }
        }
        Ok(result)
    }

    /// 所有子孙类（不含自身），按声明顺序
    pub fn descendants(&self, name: &str) -> Vec<&EmClass> {
        self.classes
            .iter()
            .filter(|c| c.name != name)
            .filter(|c| {
                self.ancestors(&c.name)
                    .map(|chain| chain.iter().any(|a| a.name == name))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// 校验编辑模型
    ///
    /// 所有问题汇总为一个错误返回
    pub fn validate(&self, handlers: &DataHandlerRegistry) -> LodelResult<()> {
        let mut errors: Vec<(String, LodelError)> = Vec::new();
        let mut names = HashSet::new();

        for class in &self.classes {
            if !names.insert(class.name.as_str()) {
                errors.push((
                    class.name.clone(),
                    crate::lodel_error!(model, format!("类名 {} 重复", class.name)),
                ));
            }
        }

        for class in &self.classes {
            for parent in &class.parents {
                if self.class(parent).is_none() {
                    errors.push((
                        class.name.clone(),
                        crate::lodel_error!(model, format!("父类 {} 不存在", parent)),
                    ));
                }
            }
        }
        if !errors.is_empty() {
            return Err(Self::aggregate(errors));
        }

        for class in &self.classes {
            if let Err(e) = self.ancestors(&class.name) {
                errors.push((class.name.clone(), e));
            }
        }
        if !errors.is_empty() {
            return Err(Self::aggregate(errors));
        }

        for class in &self.classes {
            let mut field_names = HashSet::new();
            for field in &class.fields {
                let key = format!("{}.{}", class.name, field.name);
                if !field_names.insert(field.name.as_str()) {
                    errors.push((key.clone(), crate::lodel_error!(model, "字段重复声明")));
                }
                match handlers.create(&field.data_handler, &field.options) {
                    Ok(handler) => {
                        if let Some((bclass, bfield)) = handler.back_reference() {
                            let target_handler = self.all_fields(bclass).ok().and_then(|fields| {
                                fields
                                    .iter()
                                    .find(|(_, f)| f.name == bfield)
                                    .map(|(_, f)| f.data_handler.clone())
                            });
                            match target_handler.as_deref() {
                                None => errors.push((
                                    key.clone(),
                                    crate::lodel_error!(
                                        model,
                                        format!("反向引用 {}.{} 不存在", bclass, bfield)
                                    ),
                                )),
                                // map 的键无法由反向引用维护
                                Some("map") => errors.push((
                                    key.clone(),
                                    crate::lodel_error!(
                                        model,
                                        format!("反向引用 {}.{} 不能是 map 字段", bclass, bfield)
                                    ),
                                )),
                                Some(_) => {}
                            }
                        }
                        for linked in handler.linked_classes() {
                            if self.class(linked).is_none() {
                                errors.push((
                                    key.clone(),
                                    crate::lodel_error!(
                                        model,
                                        format!("引用的类 {} 不存在", linked)
                                    ),
                                ));
                            }
                        }
                    }
                    Err(e) => errors.push((key, e)),
                }
            }

            if class.is_abstract {
                continue;
            }
            let uid_count = self
                .all_fields(&class.name)?
                .iter()
                .filter(|(_, f)| {
                    handlers
                        .create(&f.data_handler, &f.options)
                        .map(|h| h.is_primary_key())
                        .unwrap_or(false)
                })
                .count();
            if uid_count == 0 {
                errors.push((
                    class.name.clone(),
                    crate::lodel_error!(model, "具体类必须至少有一个主键字段"),
                ));
            }
            match self.datasource_of(&class.name) {
                Ok(Some(_)) => {}
                _ => errors.push((
                    class.name.clone(),
                    crate::lodel_error!(model, "具体类没有分配数据源"),
                )),
            }
        }

        if !errors.is_empty() {
            return Err(Self::aggregate(errors));
        }
        debug!("编辑模型 {} 校验通过", self.name);
        Ok(())
    }

    fn aggregate(errors: Vec<(String, LodelError)>) -> LodelError {
        LodelError::ApiErrors {
            message: crate::i18n::t("error.model_validation"),
            errors,
        }
    }
}

/// 测试和示例使用的编辑模型
///
/// 结构：`Object`（根，抽象）下有 `Person`、`Textes`（抽象）和 `Publication`（抽象），
/// `Article` 继承 `Textes`，`Numero` 继承 `Publication`
pub fn sample_model(datasource: &str) -> EditorialModel {
    use serde_json::json;

    EditorialModel::new("sample")
        .with_class(
            EmClass::new("Object")
                .abstract_class()
                .datasource(datasource)
                .field(EmField::new("lodel_id", "uniqid"))
                .field(EmField::new("class_id", "leobject_subclass_identifier").with_option("level", json!("class")))
                .field(EmField::new("type_id", "leobject_subclass_identifier").with_option("level", json!("type")))
                .field(
                    EmField::new("date_create", "datetime")
                        .with_option("now_on_create", json!(true))
                        .with_option("internal", json!("automatic")),
                ),
        )
        .with_class(
            EmClass::new("Person")
                .parent("Object")
                .field(EmField::new("firstname", "varchar"))
                .field(EmField::new("lastname", "varchar").with_option("nullable", json!(false)))
                .field(EmField::new("fullname", "format_string")
                    .with_option("format_string", json!("%s %s"))
                    .with_option("field_list", json!(["firstname", "lastname"])))
                .field(
                    EmField::new("linked_texts", "list")
                        .with_option("allowed_classes", json!(["Article"]))
                        .with_option("back_reference", json!(["Article", "author"])),
                ),
        )
        .with_class(
            EmClass::new("Textes")
                .abstract_class()
                .parent("Object")
                .field(EmField::new("titre", "varchar"))
                .field(EmField::new("soustitre", "varchar"))
                .field(EmField::new("resume", "mlstring").with_option("default_lang", json!("fre"))),
        )
        .with_class(
            EmClass::new("Article")
                .parent("Textes")
                .field(
                    EmField::new("author", "link")
                        .with_option("allowed_classes", json!(["Person"]))
                        .with_option("back_reference", json!(["Person", "linked_texts"])),
                ),
        )
        .with_class(
            EmClass::new("Publication")
                .abstract_class()
                .parent("Object")
                .field(EmField::new("titre", "varchar")),
        )
        .with_class(
            EmClass::new("Numero")
                .parent("Publication")
                .field(EmField::new("articles", "set").with_option("allowed_classes", json!(["Article"]))),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_model_is_valid() {
        let model = sample_model("default");
        model.validate(&DataHandlerRegistry::new()).unwrap();
    }

    #[test]
    fn test_hierarchy_queries() {
        let model = sample_model("default");
        let chain: Vec<_> = model
            .ancestors("Article")
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(chain, vec!["Object", "Textes"]);
        assert_eq!(model.class_level("Article").unwrap(), "Textes");
        assert_eq!(model.class_level("Textes").unwrap(), "Textes");
        assert_eq!(model.root_of("Numero").unwrap(), "Object");
        assert_eq!(model.datasource_of("Numero").unwrap().as_deref(), Some("default"));

        let fields = model.all_fields("Article").unwrap();
        assert_eq!(fields[0].1.name, "lodel_id");
        assert!(fields.iter().any(|(owner, f)| owner == "Textes" && f.name == "soustitre"));

        let descendants: Vec<_> = model.descendants("Object").iter().map(|c| c.name.as_str()).collect();
        assert!(descendants.contains(&"Numero"));
        assert!(!descendants.contains(&"Object"));
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let model = EditorialModel::new("broken")
            .with_class(
                EmClass::new("Root")
                    .datasource("default")
                    .field(EmField::new("title", "nosuchhandler"))
                    .field(
                        EmField::new("link", "link")
                            .with_option("back_reference", serde_json::json!(["Root", "missing"])),
                    ),
            );
        let err = model.validate(&DataHandlerRegistry::new()).unwrap_err();
        assert!(err.has_error_for("Root.title"));
        assert!(err.has_error_for("Root.link"));
        // 缺少主键字段
        assert!(err.has_error_for("Root"));
    }

    #[test]
    fn test_map_cannot_be_back_reference_target() {
        let model = EditorialModel::new("mapped")
            .with_class(
                EmClass::new("Holder")
                    .datasource("default")
                    .field(EmField::new("lodel_id", "uniqid"))
                    .field(
                        EmField::new("items", "map")
                            .with_option("allowed_classes", serde_json::json!(["Item"])),
                    ),
            )
            .with_class(
                EmClass::new("Item")
                    .datasource("default")
                    .field(EmField::new("lodel_id", "uniqid"))
                    .field(
                        EmField::new("holder", "link")
                            .with_option("allowed_classes", serde_json::json!(["Holder"]))
                            .with_option("back_reference", serde_json::json!(["Holder", "items"])),
                    ),
            );
        let err = model.validate(&DataHandlerRegistry::new()).unwrap_err();
        assert!(err.has_error_for("Item.holder"));
        assert!(!err.has_error_for("Holder.items"));
    }

    #[test]
    fn test_cycle_detection() {
        let model = EditorialModel::new("cycle")
            .with_class(EmClass::new("A").parent("B"))
            .with_class(EmClass::new("B").parent("A"));
        assert!(model.validate(&DataHandlerRegistry::new()).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let model = sample_model("default");
        let text = toml::to_string(&model).unwrap();
        let parsed = EditorialModel::from_toml_str(&text).unwrap();
        assert_eq!(parsed.classes.len(), model.classes.len());
        assert!(parsed.class("Textes").unwrap().is_abstract);
    }
}
