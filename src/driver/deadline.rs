//! Deadline
//!
//! 한 번의 논리 작업 전체에 적용되는 절대 마감 시각

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// 마감 시각
///
/// 작업 시작 시점에 한 번 계산하고, 내부 재시도는 남은 시간만 사용한다.
/// `None` 은 마감 없음.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
    original_timeout: Option<Duration>,
}

impl Deadline {
    /// 마감 없음
    pub fn never() -> Self {
        Self {
            at: None,
            original_timeout: None,
        }
    }

    /// 지금부터 `timeout` 후 (`None` 이면 마감 없음)
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => Self::after(t),
            None => Self::never(),
        }
    }

    /// 지금부터 `timeout` 후
    pub fn after(timeout: Duration) -> Self {
        Self {
            // 표현할 수 없을 만큼 먼 마감은 마감 없음으로 취급
            at: Instant::now().checked_add(timeout),
            original_timeout: Some(timeout),
        }
    }

    /// 마감 시각
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// 처음 지정된 타임아웃 (메시지용)
    pub fn original_timeout(&self) -> Option<Duration> {
        self.original_timeout
    }

    /// 마감 경과 여부
    pub fn expired(&self) -> bool {
        matches!(self.at, Some(at) if at <= Instant::now())
    }

    /// 남은 시간 (0 이상), 마감이 없으면 `None`
    pub fn to_timeout(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// 더 이른 마감
    pub fn min(a: Deadline, b: Deadline) -> Deadline {
        match (a.at, b.at) {
            (None, _) => b,
            (_, None) => a,
            (Some(x), Some(y)) => {
                if x <= y {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// 마감까지 future 실행, 마감이 지나면 `None`
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.at {
            Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
            None => Some(fut.await),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}

// ============================================================================
// Tests
// ============================================================================
