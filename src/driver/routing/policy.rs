//! 라우팅 정책
//!
//! 역할별 후보 주소 중 하나를 고르는 전략을 정의합니다.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use crate::driver::address::Address;

/// 라우팅 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// 사용 중인 연결이 가장 적은 주소 (동률이면 랜덤, 기본값)
    #[default]
    LeastConnected,
    /// 라운드 로빈
    RoundRobin,
}

/// 사용 중인 연결이 가장 적은 주소 선택
///
/// 동률인 주소가 여럿이면 그 중 하나를 랜덤으로 고른다.
pub fn select_address<F>(addresses: &[Address], in_use: F) -> Option<Address>
where
    F: Fn(&Address) -> usize,
{
    let counts: Vec<usize> = addresses.iter().map(&in_use).collect();
    let least = *counts.iter().min()?;
    let candidates: Vec<&Address> = addresses
        .iter()
        .zip(&counts)
        .filter(|(_, count)| **count == least)
        .map(|(address, _)| address)
        .collect();
    candidates.choose(&mut rand::thread_rng()).map(|a| (*a).clone())
}

/// 서버 선택기
#[derive(Debug, Default)]
pub struct ServerSelector {
    /// 라우팅 정책
    policy: RoutingPolicy,
    /// 라운드 로빈 인덱스
    round_robin_index: AtomicUsize,
}

impl ServerSelector {
    /// 새 선택기 생성
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    /// 후보 중 하나 선택. 후보가 없으면 `None`.
    pub fn select<F>(&self, addresses: &[Address], in_use: F) -> Option<Address>
    where
        F: Fn(&Address) -> usize,
    {
        if addresses.is_empty() {
            return None;
        }

        match self.policy {
            RoutingPolicy::LeastConnected => select_address(addresses, in_use),
            RoutingPolicy::RoundRobin => {
                let index = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
                Some(addresses[index % addresses.len()].clone())
            }
        }
    }

    /// 현재 정책 조회
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn servers() -> Vec<Address> {
        vec![
            Address::new("server1", 7687),
            Address::new("server2", 7687),
            Address::new("server3", 7687),
        ]
    }

    #[test]
    fn test_least_connected_selection() {
        let servers = servers();
        let counts: HashMap<Address, usize> = [
            (servers[0].clone(), 3),
            (servers[1].clone(), 1),
            (servers[2].clone(), 2),
        ]
        .into_iter()
        .collect();

        for _ in 0..10 {
            let selected = select_address(&servers, |a| counts[a]).unwrap();
            assert_eq!(selected.host, "server2");
        }
    }

    #[test]
    fn test_least_connected_ties_are_random() {
        let servers = servers();
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let selected = select_address(&servers, |a| usize::from(a.host == "server3"));
            seen.insert(selected.unwrap().host);
        }
        // server3 은 더 바쁘므로 선택되지 않는다
        assert_eq!(
            seen,
            ["server1".to_string(), "server2".to_string()]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_round_robin_selection() {
        let selector = ServerSelector::new(RoutingPolicy::RoundRobin);
        let servers = servers();

        // 라운드 로빈으로 순환 선택
        let picked: Vec<String> = (0..4)
            .map(|_| selector.select(&servers, |_| 0).unwrap().host)
            .collect();
        assert_eq!(picked, vec!["server1", "server2", "server3", "server1"]);
    }

    #[test]
    fn test_empty_servers() {
        let selector = ServerSelector::default();
        assert_eq!(selector.policy(), RoutingPolicy::LeastConnected);
        assert!(selector.select(&[], |_| 0).is_none());
        assert!(select_address(&[], |_| 0).is_none());
    }
}
