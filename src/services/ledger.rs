use crate::{
    error::{AppError, Result},
    models::notification::DeliveryRecord,
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::debug;

/// 投递台账：每个 (notification, user) 一条记录
///
/// 唯一性通过 DashMap 的 entry API 保证，插入即判重，
/// 并发 fan-out 不会产生重复记录。
#[derive(Clone)]
pub struct DeliveryLedger {
    records: Arc<DashMap<(String, String), DeliveryRecord>>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// 幂等写入：已存在的记录原样返回，第二个返回值标记本次是否新建
    pub fn record_delivery(
        &self,
        notification_id: &str,
        user_id: &str,
        marker: Option<&str>,
    ) -> (DeliveryRecord, bool) {
        let key = (notification_id.to_string(), user_id.to_string());
        match self.records.entry(key) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let record = DeliveryRecord {
                    notification_id: notification_id.to_string(),
                    user_id: user_id.to_string(),
                    read: false,
                    marker: marker.map(|m| m.to_string()),
                    delivered_at: Utc::now(),
                };
                debug!("Recorded delivery of {} to {}", notification_id, user_id);
                (slot.insert(record).clone(), true)
            }
        }
    }

    pub fn get(&self, notification_id: &str, user_id: &str) -> Option<DeliveryRecord> {
        self.records
            .get(&(notification_id.to_string(), user_id.to_string()))
            .map(|r| r.clone())
    }

    pub fn mark_read(&self, notification_id: &str, user_id: &str, read: bool) -> Result<DeliveryRecord> {
        let mut record = self
            .records
            .get_mut(&(notification_id.to_string(), user_id.to_string()))
            .ok_or_else(|| AppError::not_found("Delivery record"))?;
        record.read = read;
        Ok(record.clone())
    }

    pub fn set_marker(
        &self,
        notification_id: &str,
        user_id: &str,
        marker: Option<String>,
    ) -> Result<DeliveryRecord> {
        let mut record = self
            .records
            .get_mut(&(notification_id.to_string(), user_id.to_string()))
            .ok_or_else(|| AppError::not_found("Delivery record"))?;
        record.marker = marker;
        Ok(record.clone())
    }

    /// 某用户的全部投递记录，按投递时间排序
    pub fn for_user(&self, user_id: &str, read: Option<bool>, ascending: bool) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.user_id == user_id && read.map_or(true, |r| record.read == r)
            })
            .map(|entry| entry.value().clone())
            .collect();

        records.sort_by(|a, b| {
            if ascending {
                a.delivered_at.cmp(&b.delivered_at)
            } else {
                b.delivered_at.cmp(&a.delivered_at)
            }
        });
        records
    }

    pub fn count_for_user(&self, user_id: &str, read: Option<bool>) -> usize {
        self.records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.user_id == user_id && read.map_or(true, |r| record.read == r)
            })
            .count()
    }

    /// 某条通知的全部收件人记录
    pub fn recipients(&self, notification_id: &str) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().notification_id == notification_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        records
    }

    /// 级联删除，返回被移除的记录数
    pub fn remove_for_notification(&self, notification_id: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.notification_id != notification_id);
        before - self.records.len()
    }
}

impl Default for DeliveryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_delivery_is_idempotent() {
        let ledger = DeliveryLedger::new();

        let (first, created) = ledger.record_delivery("n1", "u1", Some("curation"));
        assert!(created);

        let (second, created_again) = ledger.record_delivery("n1", "u1", Some("other"));
        assert!(!created_again);
        // 第二次调用原样返回首条记录，marker 不被覆盖
        assert_eq!(second.marker, first.marker);
        assert_eq!(second.delivered_at, first.delivered_at);
        assert_eq!(ledger.recipients("n1").len(), 1);
    }

    #[test]
    fn read_flag_toggles_without_drift() {
        let ledger = DeliveryLedger::new();
        ledger.record_delivery("n1", "u1", None);

        assert!(ledger.mark_read("n1", "u1", true).unwrap().read);
        assert!(!ledger.mark_read("n1", "u1", false).unwrap().read);
        for _ in 0..3 {
            ledger.mark_read("n1", "u1", true).unwrap();
            ledger.mark_read("n1", "u1", false).unwrap();
        }
        assert!(!ledger.get("n1", "u1").unwrap().read);
    }

    #[test]
    fn mark_read_on_missing_record_is_not_found() {
        let ledger = DeliveryLedger::new();
        assert!(matches!(
            ledger.mark_read("n1", "ghost", true),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn cascade_removes_every_record_for_the_notification() {
        let ledger = DeliveryLedger::new();
        for user in ["u1", "u2", "u3", "u4", "u5"] {
            ledger.record_delivery("n1", user, None);
        }
        ledger.record_delivery("n2", "u1", None);

        assert_eq!(ledger.remove_for_notification("n1"), 5);
        assert!(ledger.recipients("n1").is_empty());
        assert_eq!(ledger.recipients("n2").len(), 1);
    }

    #[test]
    fn for_user_filters_and_orders() {
        let ledger = DeliveryLedger::new();
        ledger.record_delivery("n1", "u1", None);
        ledger.record_delivery("n2", "u1", None);
        ledger.record_delivery("n3", "u2", None);
        ledger.mark_read("n1", "u1", true).unwrap();

        assert_eq!(ledger.count_for_user("u1", None), 2);
        assert_eq!(ledger.count_for_user("u1", Some(true)), 1);

        let unread = ledger.for_user("u1", Some(false), false);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].notification_id, "n2");

        let ascending = ledger.for_user("u1", None, true);
        assert!(ascending[0].delivered_at <= ascending[1].delivered_at);
    }
}
