//! MongoDB查询构建器模块
//!
//! 普通过滤器生成 `$match` 文档，关系过滤器通过 `$lookup` 聚合阶段实现

use super::utils::data_value_to_bson;
use crate::error::LodelResult;
use crate::leapi::query::{OrderClause, QueryOperator, RelationalFilter, SimpleFilter, SortDirection};
use crate::leapi::LeModel;
use crate::security::IdentifierValidator;
use crate::types::{DataValue, DatasourceKind};
use mongodb::bson::{doc, Bson, Document, Regex};
use rat_logger::debug;

/// 关系过滤器查找结果的临时字段前缀
const LOOKUP_PREFIX: &str = "__lodel_rel";

/// `like` 模式转为不区分大小写的锚定正则
fn like_pattern(value: &DataValue) -> String {
    let text = match value {
        DataValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let body = text
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{}$", body)
}

fn list_bson(value: &DataValue) -> Bson {
    match value {
        DataValue::Array(items) => Bson::Array(items.iter().map(data_value_to_bson).collect()),
        other => Bson::Array(vec![data_value_to_bson(other)]),
    }
}

/// MongoDB查询构建器
pub struct MongoQueryBuilder {
    validator: IdentifierValidator,
}

impl Default for MongoQueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MongoQueryBuilder {
    pub fn new() -> Self {
        Self {
            validator: IdentifierValidator::new(DatasourceKind::MongoDB),
        }
    }

    pub fn validate(&self, identifier: &str) -> LodelResult<()> {
        self.validator.validate(identifier)
    }

    /// 单个字段的条件
    ///
    /// `path` 可以是关系查找结果中的嵌套路径，调用方负责验证各段
    fn condition(path: &str, operator: QueryOperator, value: &DataValue) -> Document {
        let bson = data_value_to_bson(value);
        match operator {
            QueryOperator::Eq => doc! { path: { "$eq": bson } },
            QueryOperator::Ne => doc! { path: { "$ne": bson } },
            QueryOperator::Lt => doc! { path: { "$lt": bson } },
            QueryOperator::Le => doc! { path: { "$lte": bson } },
            QueryOperator::Gt => doc! { path: { "$gt": bson } },
            QueryOperator::Ge => doc! { path: { "$gte": bson } },
            QueryOperator::In => doc! { path: { "$in": list_bson(value) } },
            QueryOperator::NotIn => doc! { path: { "$nin": list_bson(value) } },
            QueryOperator::Like => doc! { path: { "$regex": like_pattern(value), "$options": "i" } },
            QueryOperator::NotLike => doc! {
                path: { "$not": Regex { pattern: like_pattern(value), options: "i".to_string() } }
            },
        }
    }

    fn and(conditions: Vec<Document>) -> Document {
        match conditions.len() {
            0 => Document::new(),
            1 => conditions.into_iter().next().unwrap_or_default(),
            _ => doc! { "$and": conditions },
        }
    }

    /// 普通过滤器的查询文档，同一字段的多个条件以 `$and` 组合
    pub fn filter_document(&self, filters: &[SimpleFilter]) -> LodelResult<Document> {
        let mut conditions = Vec::with_capacity(filters.len());
        for filter in filters {
            self.validate(&filter.field)?;
            conditions.push(Self::condition(&filter.field, filter.operator, &filter.value));
        }
        let document = Self::and(conditions);
        debug!("[MongoDB] 过滤文档: {:?}", document);
        Ok(document)
    }

    /// 关系过滤器的聚合阶段：`$lookup` 每个被引用的具体类集合，`$match`
    /// 查找结果中的字段，最后移除临时数组
    pub fn relational_stages(&self, model: &LeModel, filters: &[RelationalFilter]) -> LodelResult<Vec<Document>> {
        let mut lookups = Vec::new();
        let mut matches = Vec::new();
        let mut helpers = Document::new();

        for (i, filter) in filters.iter().enumerate() {
            self.validate(&filter.field)?;
            let mut alternatives = Vec::new();
            for (class_name, ref_field) in &filter.references {
                self.validate(ref_field)?;
                let referenced = model.class(class_name)?;
                let Some(foreign_field) = referenced.uid().first() else {
                    continue;
                };
                for (j, concrete) in referenced.concrete_descendants().iter().enumerate() {
                    self.validate(concrete)?;
                    let alias = format!("{}_{}_{}_{}", LOOKUP_PREFIX, i, class_name, j);
                    lookups.push(doc! {
                        "$lookup": {
                            "from": concrete.as_str(),
                            "localField": filter.field.as_str(),
                            "foreignField": foreign_field.as_str(),
                            "as": alias.as_str(),
                        }
                    });
                    alternatives.push(Self::condition(
                        &format!("{}.{}", alias, ref_field),
                        filter.operator,
                        &filter.value,
                    ));
                    helpers.insert(alias, 0);
                }
            }
            // 被引用类没有任何具体类时不可能匹配
            matches.push(match alternatives.len() {
                0 => doc! { "$expr": false },
                1 => alternatives.into_iter().next().unwrap_or_default(),
                _ => doc! { "$or": alternatives },
            });
        }

        let mut stages = lookups;
        if !matches.is_empty() {
            stages.push(doc! { "$match": Self::and(matches) });
        }
        if !helpers.is_empty() {
            stages.push(doc! { "$project": helpers });
        }
        Ok(stages)
    }

    pub fn sort_document(&self, order: &[OrderClause]) -> LodelResult<Document> {
        let mut sort = Document::new();
        for clause in order {
            self.validate(&clause.field)?;
            let direction = match clause.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(clause.field.clone(), direction);
        }
        Ok(sort)
    }

    /// 字段列表的投影，始终去掉 `_id`
    pub fn projection(&self, field_list: &[String]) -> LodelResult<Document> {
        let mut projection = doc! { "_id": 0 };
        for field in field_list {
            self.validate(field)?;
            projection.insert(field.clone(), 1);
        }
        Ok(projection)
    }

    /// 单个集合上的聚合管道
    ///
    /// `paginate` 为 None 时不加入排序和分页，由调用方在合并结果后处理
    pub fn pipeline(
        &self,
        model: &LeModel,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
        order: &[OrderClause],
        field_list: &[String],
        paginate: Option<(usize, Option<usize>)>,
    ) -> LodelResult<Vec<Document>> {
        let mut pipeline = Vec::new();
        let matcher = self.filter_document(filters)?;
        if !matcher.is_empty() {
            pipeline.push(doc! { "$match": matcher });
        }
        pipeline.extend(self.relational_stages(model, relational_filters)?);
        if let Some((offset, limit)) = paginate {
            if !order.is_empty() {
                pipeline.push(doc! { "$sort": self.sort_document(order)? });
            }
            if offset > 0 {
                pipeline.push(doc! { "$skip": offset as i64 });
            }
            if let Some(limit) = limit {
                pipeline.push(doc! { "$limit": limit as i64 });
            }
        }
        pipeline.push(doc! { "$project": self.projection(field_list)? });
        Ok(pipeline)
    }
}
