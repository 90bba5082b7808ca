//! 标识符安全验证
//!
//! 表名、列名和集合名在拼接进查询前都要经过验证，防止SQL/NoSQL注入。
//! 编辑模型的字段名允许连字符，SQL中始终以反引号包裹。

use crate::error::LodelResult;
use crate::types::DatasourceKind;

/// 标识符验证器
pub struct IdentifierValidator {
    kind: DatasourceKind,
}

impl IdentifierValidator {
    pub fn new(kind: DatasourceKind) -> Self {
        Self { kind }
    }

    /// 验证字段名、表名或集合名
    ///
    /// # 返回值
    /// * `Ok(())` - 标识符安全
    /// * `Err(LodelError)` - 标识符为空、过长或包含非法字符
    pub fn validate(&self, identifier: &str) -> LodelResult<()> {
        if identifier.is_empty() {
            return Err(crate::lodel_error!(field, identifier, "标识符不能为空"));
        }
        if identifier.len() > 64 {
            return Err(crate::lodel_error!(
                field,
                identifier,
                "标识符长度不能超过64个字符"
            ));
        }

        match self.kind {
            DatasourceKind::MySQL => self.validate_sql(identifier),
            DatasourceKind::MongoDB => self.validate_nosql(identifier),
            DatasourceKind::JsonFile | DatasourceKind::Dummy => Ok(()),
        }
    }

    /// 验证并加上引号
    pub fn quote(&self, identifier: &str) -> LodelResult<String> {
        self.validate(identifier)?;
        match self.kind {
            DatasourceKind::MySQL => Ok(format!("`{}`", identifier)),
            _ => Ok(identifier.to_string()),
        }
    }

    fn validate_sql(&self, identifier: &str) -> LodelResult<()> {
        if identifier.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(crate::lodel_error!(
                field,
                identifier,
                "SQL标识符不能以数字开头"
            ));
        }
        for (i, ch) in identifier.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-' {
                return Err(crate::lodel_error!(
                    field,
                    identifier,
                    format!("SQL标识符包含非法字符 '{}' 在位置 {}", ch, i)
                ));
            }
        }
        Ok(())
    }

    fn validate_nosql(&self, identifier: &str) -> LodelResult<()> {
        // `$` 开头为操作符，`.` 为嵌套路径分隔符
        if identifier.starts_with('$') {
            return Err(crate::lodel_error!(field, identifier, "NoSQL标识符不能以$开头"));
        }
        if identifier.contains('.') || identifier.contains('\0') {
            return Err(crate::lodel_error!(
                field,
                identifier,
                "NoSQL标识符不能包含点号或空字符"
            ));
        }
        if identifier == "_id" || identifier.starts_with("system.") {
            return Err(crate::lodel_error!(
                field,
                identifier,
                format!("标识符不能使用MongoDB保留名称: {}", identifier)
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_identifiers() {
        let validator = IdentifierValidator::new(DatasourceKind::MySQL);

        assert!(validator.validate("lodel_id").is_ok());
        assert!(validator.validate("class_textes_resume").is_ok());
        assert!(validator.validate("sous-titre").is_ok());

        assert!(validator.validate("").is_err());
        assert!(validator.validate("9titre").is_err());
        assert!(validator.validate("ti tre").is_err());
        assert!(validator.validate("titre`; DROP").is_err());
        assert_eq!(validator.quote("object").unwrap(), "`object`");
    }

    #[test]
    fn test_nosql_identifiers() {
        let validator = IdentifierValidator::new(DatasourceKind::MongoDB);

        assert!(validator.validate("Article").is_ok());
        assert!(validator.validate("9titre").is_ok());

        assert!(validator.validate("$where").is_err());
        assert!(validator.validate("a.b").is_err());
        assert!(validator.validate("_id").is_err());
        assert_eq!(validator.quote("titre").unwrap(), "titre");
    }
}
