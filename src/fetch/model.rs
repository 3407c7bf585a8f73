use crate::config::SourceKind;
use serde_json::Value;

/// 抓取错误分型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// 上游明确拒绝（非限流的 4xx），不可重试
    Rejected,
    /// 超时或 5xx，内部有限重试后升级为最终失败
    Transient,
    /// 429 限流，走独立的退避路径
    RateLimited,
    /// 在调度或重试边界被取消
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl FetchError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Rejected,
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Cancelled,
            message: msg.into(),
            retryable: false,
        }
    }

    /// 重试预算耗尽后的最终形态
    pub fn exhausted(self) -> Self {
        Self {
            retryable: false,
            message: format!("重试次数耗尽: {}", self.message),
            ..self
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

/// 逻辑抓取请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// 一页花名册（url 可能来自上一页的 next 链接）
    RosterPage { url: String },
    /// 单个成员的详情
    MemberDetail { id: i64 },
    /// 按姓名搜索成员
    SearchMember { name: String },
    /// 按名称搜索部门
    SearchDivision { name: String },
}

impl FetchRequest {
    pub fn op_name(&self) -> &'static str {
        match self {
            FetchRequest::RosterPage { .. } => "roster_page",
            FetchRequest::MemberDetail { .. } => "member_detail",
            FetchRequest::SearchMember { .. } => "search_member",
            FetchRequest::SearchDivision { .. } => "search_division",
        }
    }
}

/// 一次成功抓取得到的原始记录。抓取后不再修改，
/// 后续同键抓取产生新的记录而不是原地更新。
#[derive(Debug, Clone)]
pub struct Record {
    pub body: Value,
    pub source: SourceKind,
    pub fetched_at: i64,
}

/// 单个逻辑请求的结果
#[derive(Debug)]
pub struct FetchOutcome {
    pub request: FetchRequest,
    pub result: Result<Record, FetchError>,
    pub from_cache: bool,
}

/// 批量抓取的汇总。结果与提交顺序无关，逐请求报告成败，
/// 单个请求失败不会拖垮兄弟请求。
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl BatchReport {
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> Vec<(&FetchRequest, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.request, e)))
            .collect()
    }

    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.from_cache).count()
    }
}
