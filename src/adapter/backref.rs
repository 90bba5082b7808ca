//! 反向引用维护计划
//!
//! 根据对象修改前后的数据，计算每个声明了反向引用的引用字段在被引用对象上
//! 需要执行的更新。对 n 个对象、m 个引用字段、o 个被引用对象，代价为 O(n·m·o)。

use crate::error::LodelResult;
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::DataValue;

/// 一个对象的修改
///
/// 插入时 `before` 为 None，删除时 `after` 为 None
#[derive(Debug, Clone)]
pub struct ObjectChange {
    pub uid: DataValue,
    pub before: Option<Row>,
    pub after: Option<Row>,
}

/// 反向字段上的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackrefAction {
    /// 多值反向字段加入 `value`
    Add,
    /// 多值反向字段移除 `value`
    Remove,
    /// 单值反向字段设为 `value`
    Set,
    /// 单值反向字段当前等于 `value` 时置空
    Unset,
}

/// 被引用对象上的一次更新
#[derive(Debug, Clone, PartialEq)]
pub struct BackrefUpdate {
    /// 反向字段所在的类（被引用对象可能是其子类）
    pub class: String,
    /// 被引用对象的标识
    pub uid: DataValue,
    pub field: String,
    pub action: BackrefAction,
    pub value: DataValue,
}

/// 引用字段值中的全部标识
pub fn referenced_uids(value: Option<&DataValue>) -> Vec<DataValue> {
    let mut uids: Vec<DataValue> = Vec::new();
    let mut push = |v: &DataValue| {
        if !v.is_null() && !uids.contains(v) {
            uids.push(v.clone());
        }
    };
    match value {
        None | Some(DataValue::Null) => {}
        Some(DataValue::Array(items)) => items.iter().for_each(&mut push),
        Some(DataValue::Object(map)) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter().for_each(|k| push(&map[k]));
        }
        Some(other) => push(other),
    }
    uids
}

/// 计算反向引用更新
pub fn plan_backref_updates(
    model: &LeModel,
    class: &LeClass,
    changes: &[ObjectChange],
) -> LodelResult<Vec<BackrefUpdate>> {
    let mut updates = Vec::new();
    for (fname, handler) in class.reference_handlers(true) {
        let Some((back_class, back_field)) = handler.back_reference() else {
            continue;
        };
        let back_handler = model.class(back_class)?.field(back_field)?.clone();
        let multiple = back_handler.is_reference() && !back_handler.is_singlereference();

        for change in changes {
            let before = referenced_uids(change.before.as_ref().and_then(|r| r.get(fname.as_str())));
            let after = referenced_uids(change.after.as_ref().and_then(|r| r.get(fname.as_str())));

            for uid in before.iter().filter(|u| !after.contains(u)) {
                updates.push(BackrefUpdate {
                    class: back_class.to_string(),
                    uid: uid.clone(),
                    field: back_field.to_string(),
                    action: if multiple { BackrefAction::Remove } else { BackrefAction::Unset },
                    value: change.uid.clone(),
                });
            }
            for uid in after.iter().filter(|u| !before.contains(u)) {
                updates.push(BackrefUpdate {
                    class: back_class.to_string(),
                    uid: uid.clone(),
                    field: back_field.to_string(),
                    action: if multiple { BackrefAction::Add } else { BackrefAction::Set },
                    value: change.uid.clone(),
                });
            }
        }
    }
    Ok(updates)
}

/// 把一次反向引用更新应用到内存中的一行
///
/// 返回该行是否被修改
pub fn apply_backref_update(row: &mut Row, update: &BackrefUpdate) -> bool {
    let current = row.get(&update.field).cloned().unwrap_or(DataValue::Null);
    let next = match update.action {
        BackrefAction::Add => {
            let mut items = match current {
                DataValue::Array(items) => items,
                DataValue::Null => Vec::new(),
                other => vec![other],
            };
            if items.contains(&update.value) {
                return false;
            }
            items.push(update.value.clone());
            DataValue::Array(items)
        }
        BackrefAction::Remove => match current {
            DataValue::Array(items) => {
                let before = items.len();
                let items: Vec<DataValue> = items.into_iter().filter(|v| v != &update.value).collect();
                if items.len() == before {
                    return false;
                }
                DataValue::Array(items)
            }
            _ => return false,
        },
        BackrefAction::Set => {
            if current == update.value {
                return false;
            }
            update.value.clone()
        }
        BackrefAction::Unset => {
            if current != update.value {
                return false;
            }
            DataValue::Null
        }
    };
    row.insert(update.field.clone(), next);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_uids_flattens_values() {
        assert!(referenced_uids(None).is_empty());
        assert_eq!(
            referenced_uids(Some(&DataValue::Array(vec![
                DataValue::Int(1),
                DataValue::Int(1),
                DataValue::Int(2)
            ]))),
            vec![DataValue::Int(1), DataValue::Int(2)]
        );
        assert_eq!(referenced_uids(Some(&DataValue::Int(7))), vec![DataValue::Int(7)]);
    }

    #[test]
    fn test_apply_backref_update() {
        let mut row = Row::new();
        let add = BackrefUpdate {
            class: "Person".to_string(),
            uid: DataValue::Int(1),
            field: "linked_texts".to_string(),
            action: BackrefAction::Add,
            value: DataValue::Int(10),
        };
        assert!(apply_backref_update(&mut row, &add));
        assert!(!apply_backref_update(&mut row, &add));
        assert_eq!(row["linked_texts"], DataValue::Array(vec![DataValue::Int(10)]));

        let remove = BackrefUpdate { action: BackrefAction::Remove, ..add.clone() };
        assert!(apply_backref_update(&mut row, &remove));
        assert_eq!(row["linked_texts"], DataValue::Array(vec![]));

        let set = BackrefUpdate {
            field: "author".to_string(),
            action: BackrefAction::Set,
            ..add.clone()
        };
        assert!(apply_backref_update(&mut row, &set));
        let unset_other = BackrefUpdate {
            action: BackrefAction::Unset,
            value: DataValue::Int(99),
            ..set.clone()
        };
        assert!(!apply_backref_update(&mut row, &unset_other));
        let unset = BackrefUpdate { action: BackrefAction::Unset, ..set };
        assert!(apply_backref_update(&mut row, &unset));
        assert_eq!(row["author"], DataValue::Null);
    }
}
