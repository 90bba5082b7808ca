//! 运行时模型
//!
//! 由编辑模型编译出的类注册表。每个 [`LeClass`] 持有字段到数据处理器的映射、
//! 标识字段、抽象标记以及只读/读写数据源实例。

use crate::adapter::{Datasource, DatasourceRegistry};
use crate::datahandlers::{
    ConstructContext, DataHandler, DataHandlerRegistry, DatasConstructor, IdentifierLevel,
};
use crate::editorial_model::EditorialModel;
use crate::error::{LodelError, LodelResult};
use crate::types::{DataValue, MlString};
use rat_logger::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 一行数据：字段名到值
pub type Row = HashMap<String, DataValue>;

/// 运行时类描述
pub struct LeClass {
    name: String,
    is_abstract: bool,
    parents: Vec<String>,
    ancestors: Vec<String>,
    concrete_descendants: Vec<String>,
    root: String,
    class_level: String,
    fields: Vec<(String, Arc<dyn DataHandler>)>,
    field_index: HashMap<String, usize>,
    field_owners: HashMap<String, String>,
    uid: Vec<String>,
    datasource_name: String,
    ro_datasource: Arc<dyn Datasource>,
    rw_datasource: Option<Arc<dyn Datasource>>,
    display_name: MlString,
    help_text: MlString,
}

impl std::fmt::Debug for LeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeClass")
            .field("name", &self.name)
            .field("abstract", &self.is_abstract)
            .field("parents", &self.parents)
            .field("uid", &self.uid)
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("datasource", &self.datasource_name)
            .field("read_only", &self.rw_datasource.is_none())
            .finish()
    }
}

impl LeClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// 祖先类名，根类在前
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// 具体子孙类名（具体类包含自身）
    pub fn concrete_descendants(&self) -> &[String] {
        &self.concrete_descendants
    }

    /// 层级根类名
    pub fn root(&self) -> &str {
        &self.root
    }

    /// 根类下第一层的祖先类名
    pub fn class_level(&self) -> &str {
        &self.class_level
    }

    pub fn display_name(&self) -> &MlString {
        &self.display_name
    }

    pub fn help_text(&self) -> &MlString {
        &self.help_text
    }

    /// 是否为 `other` 或其子类
    pub fn is_a(&self, other: &str) -> bool {
        self.name == other || self.ancestors.iter().any(|a| a == other)
    }

    /// 全部字段，根类字段在前
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Arc<dyn DataHandler>)> {
        self.fields.iter().map(|(name, handler)| (name, handler))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index.contains_key(name)
    }

    pub fn field(&self, name: &str) -> LodelResult<&Arc<dyn DataHandler>> {
        self.field_index
            .get(name)
            .map(|i| &self.fields[*i].1)
            .ok_or_else(|| LodelError::UnknownField {
                class: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// 声明该字段的类名
    pub fn field_owner(&self, name: &str) -> Option<&str> {
        self.field_owners.get(name).map(|s| s.as_str())
    }

    /// 字段名列表，`include_ro` 为 false 时排除内部字段
    pub fn fieldnames(&self, include_ro: bool) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, h)| include_ro || !h.is_internal())
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// 标识字段
    pub fn uid(&self) -> &[String] {
        &self.uid
    }

    pub fn uid_fieldname(&self) -> &[String] {
        self.uid()
    }

    /// 引用字段，`with_backref` 为 true 时只返回声明了反向引用的字段
    pub fn reference_handlers(&self, with_backref: bool) -> Vec<(&String, &Arc<dyn DataHandler>)> {
        self.fields()
            .filter(|(_, h)| h.is_reference() && (!with_backref || h.back_reference().is_some()))
            .collect()
    }

    /// 存储具体类名的字段
    pub fn subclass_identifier_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, h)| h.identifier_level() == Some(IdentifierLevel::Type))
            .map(|(n, _)| n.as_str())
    }

    pub fn datasource_name(&self) -> &str {
        &self.datasource_name
    }

    pub fn ro_datasource(&self) -> &Arc<dyn Datasource> {
        &self.ro_datasource
    }

    /// 读写数据源，只读配置下返回错误
    pub fn rw_datasource(&self) -> LodelResult<&Arc<dyn Datasource>> {
        self.rw_datasource
            .as_ref()
            .ok_or_else(|| LodelError::ReadOnlyDatasource {
                datasource: self.datasource_name.clone(),
            })
    }

    pub fn is_read_only(&self) -> bool {
        self.rw_datasource.is_none()
    }

    /// 用于日志输出的数据副本，敏感字段被遮蔽
    pub fn loggable(&self, datas: &Row) -> Row {
        datas
            .iter()
            .map(|(k, v)| {
                let secret = self.field(k).map(|h| h.is_secret()).unwrap_or(false);
                let value = if secret {
                    DataValue::String("******".to_string())
                } else {
                    v.clone()
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// 检查数据的值
    ///
    /// 未知或不允许的字段、缺失的必填字段以及值错误全部汇总为一个错误
    pub fn check_datas_value(
        &self,
        datas: &Row,
        complete: bool,
        allow_internal: bool,
    ) -> LodelResult<Row> {
        let mut errors: Vec<(String, LodelError)> = Vec::new();
        let mut correct = HashSet::new();
        let mut mandatory = Vec::new();

        for (fname, handler) in &self.fields {
            if allow_internal || !handler.is_internal() {
                correct.insert(fname.as_str());
                if complete
                    && !handler.is_internal()
                    && !handler.is_nullable()
                    && handler.default().is_none()
                {
                    mandatory.push(fname.as_str());
                }
            }
        }

        let mut provided: Vec<&String> = datas.keys().collect();
        provided.sort();
        for fname in &provided {
            if !correct.contains(fname.as_str()) {
                errors.push((
                    fname.to_string(),
                    crate::lodel_error!(api, format!("未知或不允许设置的字段 '{}'", fname)),
                ));
            }
        }

        for fname in mandatory {
            if !datas.contains_key(fname) {
                errors.push((
                    fname.to_string(),
                    crate::lodel_error!(api, format!("缺少字段 '{}' 的数据", fname)),
                ));
            }
        }

        let mut checked = Row::new();
        for fname in provided {
            if !correct.contains(fname.as_str()) {
                continue;
            }
            let handler = self.field(fname)?;
            match handler.check_data_value(&datas[fname]) {
                Ok(value) => {
                    checked.insert(fname.clone(), value);
                }
                Err(e) => errors.push((fname.clone(), e)),
            }
        }

        if !errors.is_empty() {
            return Err(LodelError::DataCheckErrors {
                message: crate::i18n::t("error.check_datas"),
                errors,
            });
        }
        Ok(checked)
    }

    /// 构造全部字段的存储值
    pub fn construct_datas(&self, datas: &Row, context: &ConstructContext) -> LodelResult<Row> {
        DatasConstructor::new(self, datas, context).construct_all()
    }

    /// 一致性检查，失败的字段汇总为一个错误
    pub fn check_datas_consistency(&self, datas: &Row) -> LodelResult<()> {
        let errors: Vec<(String, LodelError)> = self
            .fields
            .iter()
            .filter_map(|(fname, handler)| {
                handler
                    .check_data_consistency(self, fname, datas)
                    .err()
                    .map(|e| (fname.clone(), e))
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LodelError::DataCheckErrors {
                message: crate::i18n::t("error.consistency"),
                errors,
            })
        }
    }

    /// 值检查、构造、一致性检查
    pub fn prepare_datas(
        &self,
        datas: &Row,
        complete: bool,
        allow_internal: bool,
        context: &ConstructContext,
    ) -> LodelResult<Row> {
        if !complete {
            warn!("{} 的数据不完整，构造和一致性检查的结果可能不稳定", self.name);
        }
        let checked = self.check_datas_value(datas, complete, allow_internal)?;
        let constructed = self.construct_datas(&checked, context)?;
        self.check_datas_consistency(&constructed)?;
        Ok(constructed)
    }
}

struct LeModelInner {
    name: String,
    classes: HashMap<String, Arc<LeClass>>,
    order: Vec<String>,
    editorial_model: EditorialModel,
}

/// 运行时模型：由编辑模型编译出的类注册表
#[derive(Clone)]
pub struct LeModel {
    inner: Arc<LeModelInner>,
}

impl std::fmt::Debug for LeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeModel")
            .field("name", &self.inner.name)
            .field("classes", &self.inner.order)
            .finish()
    }
}

impl LeModel {
    /// 校验编辑模型并编译出运行时模型
    pub async fn build(
        em: EditorialModel,
        handlers: &DataHandlerRegistry,
        datasources: &DatasourceRegistry,
    ) -> LodelResult<Self> {
        em.validate(handlers)?;

        let mut classes = HashMap::new();
        let mut order = Vec::new();

        for em_class in &em.classes {
            let ancestors: Vec<String> = em
                .ancestors(&em_class.name)?
                .iter()
                .map(|c| c.name.clone())
                .collect();
            let descendants = em.descendants(&em_class.name);
            let mut concrete_descendants: Vec<String> = Vec::new();
            if !em_class.is_abstract {
                concrete_descendants.push(em_class.name.clone());
            }
            concrete_descendants.extend(
                descendants
                    .iter()
                    .filter(|c| !c.is_abstract)
                    .map(|c| c.name.clone()),
            );

            let mut fields = Vec::new();
            let mut field_index = HashMap::new();
            let mut field_owners = HashMap::new();
            for (owner, em_field) in em.all_fields(&em_class.name)? {
                let handler = handlers.create(&em_field.data_handler, &em_field.options)?;
                field_index.insert(em_field.name.clone(), fields.len());
                field_owners.insert(em_field.name.clone(), owner);
                fields.push((em_field.name.clone(), handler));
            }
            let uid: Vec<String> = fields
                .iter()
                .filter(|(_, h)| h.is_primary_key())
                .map(|(n, _)| n.clone())
                .collect();

            let datasource_name = match em.datasource_of(&em_class.name)? {
                Some(name) => name,
                None => concrete_descendants
                    .iter()
                    .find_map(|d| em.datasource_of(d).ok().flatten())
                    .ok_or_else(|| {
                        crate::lodel_error!(
                            model,
                            format!("类 {} 没有可用的数据源", em_class.name)
                        )
                    })?,
            };
            let handles = datasources.get(&datasource_name).await?;

            let class = LeClass {
                name: em_class.name.clone(),
                is_abstract: em_class.is_abstract,
                parents: em_class.parents.clone(),
                root: ancestors.first().cloned().unwrap_or_else(|| em_class.name.clone()),
                class_level: em.class_level(&em_class.name)?,
                ancestors,
                concrete_descendants,
                fields,
                field_index,
                field_owners,
                uid,
                datasource_name,
                ro_datasource: handles.ro,
                rw_datasource: handles.rw,
                display_name: em_class.display_name.clone(),
                help_text: em_class.help_text.clone(),
            };
            debug!("编译运行时类: {:?}", class);
            order.push(em_class.name.clone());
            classes.insert(em_class.name.clone(), Arc::new(class));
        }

        info!("运行时模型 {} 构建完成，共 {} 个类", em.name, order.len());
        Ok(Self {
            inner: Arc::new(LeModelInner {
                name: em.name.clone(),
                classes,
                order,
                editorial_model: em,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 按名称获取类
    pub fn class(&self, name: &str) -> LodelResult<Arc<LeClass>> {
        self.inner
            .classes
            .get(name)
            .cloned()
            .ok_or_else(|| crate::lodel_error!(api, format!("不存在名为 {} 的类", name)))
    }

    /// 按声明顺序遍历所有类
    pub fn classes(&self) -> impl Iterator<Item = &Arc<LeClass>> {
        self.inner
            .order
            .iter()
            .filter_map(move |name| self.inner.classes.get(name))
    }

    pub fn editorial_model(&self) -> &EditorialModel {
        &self.inner.editorial_model
    }

    /// 根据子类标识字段的值找到具体类
    ///
    /// 行中没有标识时，具体的目标类即为结果
    pub fn concrete_class_of(&self, target: &Arc<LeClass>, row: &Row) -> LodelResult<Arc<LeClass>> {
        let identified = target
            .subclass_identifier_field()
            .and_then(|field| row.get(field))
            .and_then(|value| value.as_str());
        match identified {
            Some(name) => {
                let class = self.class(name)?;
                if !class.is_a(target.name()) {
                    return Err(crate::lodel_error!(
                        fatal,
                        format!("{} 不是 {} 的子类", name, target.name())
                    ));
                }
                Ok(class)
            }
            None if !target.is_abstract() => Ok(target.clone()),
            None => Err(crate::lodel_error!(
                fatal,
                format!("无法确定抽象类 {} 的数据所属的具体类", target.name())
            )),
        }
    }
}
