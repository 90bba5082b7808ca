//! 多语言错误消息模块
//!
//! 使用rat_embed_lang框架提供统一的错误消息多语言支持

use once_cell::sync::Lazy;
use rat_embed_lang::register_translations;
use std::collections::HashMap;

/// 首次查找消息时注册翻译
static TRANSLATIONS: Lazy<()> = Lazy::new(ErrorMessageI18n::register_all_translations);

/// 错误消息翻译注册器
pub struct ErrorMessageI18n;

/// 注册一组三语翻译
fn insert_translation(
    translations: &mut HashMap<String, HashMap<String, String>>,
    key: &str,
    zh: &str,
    en: &str,
    ja: &str,
) {
    let mut entry = HashMap::new();
    entry.insert("zh-CN".to_string(), zh.to_string());
    entry.insert("en-US".to_string(), en.to_string());
    entry.insert("ja-JP".to_string(), ja.to_string());
    translations.insert(key.to_string(), entry);
}

impl ErrorMessageI18n {
    /// 注册所有错误消息翻译
    pub fn register_all_translations() {
        let mut translations = HashMap::new();

        // 数据源连接错误
        insert_translation(
            &mut translations,
            "error.connection",
            "数据源连接失败: {message}",
            "Datasource connection failed: {message}",
            "データソース接続に失敗しました: {message}",
        );

        // 过滤器准备错误
        insert_translation(
            &mut translations,
            "error.prepare_filters",
            "准备过滤器时出错",
            "Error while preparing filters",
            "フィルタの準備中にエラーが発生しました",
        );

        // 字段列表错误
        insert_translation(
            &mut translations,
            "error.field_list",
            "设置查询字段列表时出错",
            "Error while setting field_list in a get query",
            "取得クエリのフィールドリスト設定中にエラーが発生しました",
        );

        // 排序分组错误
        insert_translation(
            &mut translations,
            "error.order_group",
            "排序或分组字段无效",
            "Invalid order or group field",
            "並べ替えまたはグループ化のフィールドが無効です",
        );

        // 数据检查错误
        insert_translation(
            &mut translations,
            "error.check_datas",
            "检查数据时出错",
            "Error while checking datas",
            "データチェック中にエラーが発生しました",
        );

        // 数据一致性错误
        insert_translation(
            &mut translations,
            "error.consistency",
            "数据一致性检查失败",
            "Datas consistency checks fails",
            "データ整合性チェックが失敗しました",
        );

        // 实例创建错误
        insert_translation(
            &mut translations,
            "error.create_instance",
            "创建 {class} 实例时出错",
            "Error while creating an instance of {class}",
            "{class} のインスタンス作成中にエラーが発生しました",
        );

        insert_translation(
            &mut translations,
            "error.set_instance_datas",
            "设置 {class} 实例的数据时出错",
            "Error while setting datas of a {class} instance",
            "{class} インスタンスのデータ設定中にエラーが発生しました",
        );

        // 批量插入错误
        insert_translation(
            &mut translations,
            "error.insert_multi",
            "准备 {class} 的批量插入数据时出错",
            "Error while preparing datas for a multiple insert in {class}",
            "{class} の一括挿入データ準備中にエラーが発生しました",
        );

        // 更新数据错误
        insert_translation(
            &mut translations,
            "error.update_datas",
            "更新 {class} 的数据无效",
            "Invalid update datas for {class}",
            "{class} の更新データが無効です",
        );

        // 循环构造
        insert_translation(
            &mut translations,
            "error.circular_construction",
            "字段 '{field}' 的构造出现循环依赖",
            "Circular dependency detected while constructing field '{field}'",
            "フィールド '{field}' の構築で循環依存が検出されました",
        );

        // 编辑模型校验
        insert_translation(
            &mut translations,
            "error.model_validation",
            "编辑模型校验失败",
            "Editorial model validation failed",
            "編集モデルの検証に失敗しました",
        );

        // 数据源未配置
        insert_translation(
            &mut translations,
            "error.datasource_not_found",
            "未配置名为 {name} 的数据源",
            "Datasource '{name}' is not configured",
            "データソース '{name}' が設定されていません",
        );

        // 不支持的数据源类型
        insert_translation(
            &mut translations,
            "error.unsupported_datasource",
            "不支持的数据源类型: {kind}",
            "Unsupported datasource kind: {kind}",
            "サポートされていないデータソースタイプ: {kind}",
        );

        // JSON序列化相关错误
        insert_translation(
            &mut translations,
            "error.json_serialize",
            "序列化为JSON字符串失败: {message}",
            "Failed to serialize to JSON string: {message}",
            "JSON文字列へのシリアライズ失敗: {message}",
        );

        // 注册所有翻译
        register_translations(translations);
    }

    /// 初始化错误消息多语言支持
    pub fn init() {
        Lazy::force(&TRANSLATIONS);

        // 从环境变量获取语言设置，默认为zh-CN
        let lang = std::env::var("RAT_LANG")
            .or_else(|_| std::env::var("LANG"))
            .unwrap_or_else(|_| "zh-CN".to_string());

        // 标准化语言代码
        use rat_embed_lang::normalize_language_code;
        let normalized_lang = normalize_language_code(&lang);
        set_language(&normalized_lang);
    }
}

/// 获取翻译后的消息
pub fn t(key: &str) -> String {
    Lazy::force(&TRANSLATIONS);
    rat_embed_lang::t(key)
}

/// 获取翻译后的消息并替换 `{name}` 形式的参数
pub fn tf(key: &str, args: &[(&str, &str)]) -> String {
    Lazy::force(&TRANSLATIONS);
    rat_embed_lang::tf(key, args)
}

/// 重新导出rat_embed_lang的语言设置函数
pub use rat_embed_lang::{current_language, set_language};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_follow_language() {
        set_language("en-US");
        assert_eq!(
            tf("error.create_instance", &[("class", "Person")]),
            "Error while creating an instance of Person"
        );
        set_language("zh-CN");
        assert_eq!(t("error.prepare_filters"), "准备过滤器时出错");
        assert_eq!(
            tf("error.circular_construction", &[("field", "fullname")]),
            "字段 'fullname' 的构造出现循环依赖"
        );
    }
}
