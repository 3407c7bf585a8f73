use crate::config::SourceKind;
use crate::fetch::model::Record;
use crate::transform::wookiee::wookiee_encode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 处理模式。策略在这里集中选择，调用方不感知分支细节。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// 字段改名与类型矫正
    Normalize,
    /// 在归一化之上对文本字段做确定性的 Wookiee 编码
    Wookiee,
}

/// 归一化后的花名册记录，加载阶段的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewRecord {
    pub id: i64,
    pub name: String,
    pub rank: String,
    pub division: String,
    pub manager_id: Option<i64>,
    pub salary: f64,
    pub source: SourceKind,
    pub fetched_at: i64,
}

/// 字段级告警。告警随结果一起返回，不中断整批处理。
#[derive(Debug, Clone, PartialEq)]
pub struct TransformWarning {
    pub record_key: String,
    pub field: &'static str,
    pub message: String,
}

/// 依次探测候选键名（沙盒用小写，生产用 PascalCase），返回第一个存在的值
pub fn probe<'a>(body: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| body.get(*name))
}

/// 解析自然键。数字和数字字符串都接受。
pub fn probe_id(body: &Value) -> Option<i64> {
    coerce_id(probe(body, &["id", "EmployeeID"])?)
}

fn coerce_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 文本字段：字符串直取，列表取首个字符串元素，缺失补 "N/A"
fn text_field(body: &Value, names: &[&str]) -> String {
    match probe(body, names) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        _ => "N/A".to_string(),
    }
}

/// 纯转换器。不做 I/O，同一输入与模式必得同一输出。
pub struct Transformer {
    mode: TransformMode,
    numeric_junk: Regex,
}

impl Transformer {
    pub fn new(mode: TransformMode) -> Self {
        Self {
            mode,
            numeric_junk: Regex::new(r"[^0-9.\-]+").expect("literal regex"),
        }
    }

    /// 转换一批原始记录。无法恢复的记录被跳过并产生告警。
    pub fn transform_batch(&self, records: &[Record]) -> (Vec<CrewRecord>, Vec<TransformWarning>) {
        let mut warnings = Vec::new();
        let out = records
            .iter()
            .filter_map(|r| self.transform_record(r, &mut warnings))
            .collect();
        (out, warnings)
    }

    /// 单条转换。自然键缺失或不可解析时跳过该条并告警。
    pub fn transform_record(
        &self,
        record: &Record,
        warnings: &mut Vec<TransformWarning>,
    ) -> Option<CrewRecord> {
        let body = &record.body;

        let Some(id) = probe_id(body) else {
            let key = probe(body, &["id", "EmployeeID"])
                .map(|v| v.to_string())
                .unwrap_or_else(|| "<missing>".to_string());
            warnings.push(TransformWarning {
                record_key: key,
                field: "id",
                message: "自然键缺失或无法解析，记录被跳过".to_string(),
            });
            return None;
        };

        let manager_id = match probe(body, &["manager_id", "ManagerID"]) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => {
                let parsed = coerce_id(v);
                if parsed.is_none() {
                    warnings.push(TransformWarning {
                        record_key: id.to_string(),
                        field: "manager_id",
                        message: format!("无法解析的上级引用 {}，按无上级处理", v),
                    });
                }
                parsed
            }
        };

        let salary = match probe(body, &["salary", "Salary"]) {
            Some(v) => match self.coerce_number(v) {
                Some(n) => n,
                None => {
                    warnings.push(TransformWarning {
                        record_key: id.to_string(),
                        field: "salary",
                        message: format!("无法解析的薪资 {}，记 0.0", v),
                    });
                    0.0
                }
            },
            None => {
                warnings.push(TransformWarning {
                    record_key: id.to_string(),
                    field: "salary",
                    message: "薪资字段缺失，记 0.0".to_string(),
                });
                0.0
            }
        };

        let mut out = CrewRecord {
            id,
            name: text_field(body, &["name", "Name"]),
            rank: text_field(body, &["rank", "Rank", "title", "Title"]),
            division: text_field(body, &["division", "Division"]),
            manager_id,
            salary,
            source: record.source,
            fetched_at: record.fetched_at,
        };

        if self.mode == TransformMode::Wookiee {
            // 只变换文本字段，自然键、上级链接和数值字段保持原样
            out.name = wookiee_encode(&out.name);
            out.rank = wookiee_encode(&out.rank);
            out.division = wookiee_encode(&out.division);
        }

        Some(out)
    }

    /// 数值字段：数字直取，字符串剥离非数字杂质后解析
    fn coerce_number(&self, v: &Value) -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let cleaned = self.numeric_junk.replace_all(s, "");
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse().ok()
                }
            }
            _ => None,
        }
    }
}
