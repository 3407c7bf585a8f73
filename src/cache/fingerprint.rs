/// 请求指纹
///
/// 由方法、路径和排序后的查询参数构成，与参数书写顺序无关：
/// 语义相同但参数顺序不同的请求会命中同一个缓存条目。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(method: &str, path: &str, params: &[(String, String)]) -> Self {
        let method = method.to_ascii_uppercase();
        if params.is_empty() {
            return Fingerprint(format!("{} {}", method, path));
        }

        let mut sorted = params.to_vec();
        sorted.sort();
        let query = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        Fingerprint(format!("{} {}?{}", method, path, query))
    }

    /// 从完整 URL 构造，查询串按 & 拆分后参与排序
    pub fn from_url(method: &str, url: &str) -> Self {
        match url.split_once('?') {
            Some((path, query)) => {
                let params: Vec<(String, String)> = query
                    .split('&')
                    .filter(|part| !part.is_empty())
                    .map(|part| match part.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (part.to_string(), String::new()),
                    })
                    .collect();
                Self::new(method, path, &params)
            }
            None => Self::new(method, url, &[]),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
