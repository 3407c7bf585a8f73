use serde_json::Value;

/// 上游分页响应的宽松封装。
///
/// 沙盒环境返回 `{"results": [...], "next": url}`，生产环境返回
/// `{"employees": [...]}` 或 `{"data": [...]}`，个别端点直接返回数组。
/// 这里统一按键名依次探测，解析不出数组时得到空页。
#[derive(Debug, Clone, Default)]
pub struct RosterPage {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

impl RosterPage {
    pub fn from_value(v: &Value) -> Self {
        let items = v
            .get("results")
            .and_then(|x| x.as_array())
            .or_else(|| v.get("employees").and_then(|x| x.as_array()))
            .or_else(|| v.get("data").and_then(|x| x.as_array()))
            .or_else(|| v.as_array())
            .cloned()
            .unwrap_or_default();

        let next = v
            .get("next")
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Self { items, next }
    }
}
