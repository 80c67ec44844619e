use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{LoginTokenExt, MemberExt, ReferralExt, StoreError};
use crate::models::{
    membermodel::{Member, NewMember},
    referralmodel::{CreateMemberOutcome, MemberTally, ReferralEdge, ReferredMember},
    sessionmodel::LoginToken,
};

#[derive(Debug, Default)]
struct Tables {
    members: Vec<Member>,
    referrals: Vec<ReferralEdge>,
    login_tokens: HashMap<String, LoginToken>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Wall clock, nudged forward so rows never share a timestamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn count_for(&self, referral_code: &str) -> i64 {
        self.referrals
            .iter()
            .filter(|edge| edge.referrer_code == referral_code)
            .count() as i64
    }
}

/// In-process store with the same uniqueness rules as the Postgres schema.
/// Used when no database is configured and as the test double.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn referral_edges(&self) -> Vec<ReferralEdge> {
        self.tables().referrals.clone()
    }
}

#[async_trait]
impl MemberExt for MemoryStore {
    async fn get_member(
        &self,
        member_id: Option<Uuid>,
        email: Option<&str>,
        referral_code: Option<&str>,
    ) -> Result<Option<Member>, StoreError> {
        let tables = self.tables();
        let found = if let Some(member_id) = member_id {
            tables.members.iter().find(|m| m.id == member_id)
        } else if let Some(email) = email {
            tables
                .members
                .iter()
                .find(|m| m.email.eq_ignore_ascii_case(email))
        } else if let Some(referral_code) = referral_code {
            tables.members.iter().find(|m| m.referral_code == referral_code)
        } else {
            None
        };
        Ok(found.cloned())
    }

    async fn create_member(
        &self,
        new_member: NewMember,
        referrer_code: Option<&str>,
    ) -> Result<CreateMemberOutcome, StoreError> {
        let mut tables = self.tables();

        if tables
            .members
            .iter()
            .any(|m| m.email.eq_ignore_ascii_case(&new_member.email))
        {
            return Ok(CreateMemberOutcome::EmailTaken);
        }
        if tables
            .members
            .iter()
            .any(|m| m.referral_code == new_member.referral_code)
        {
            return Ok(CreateMemberOutcome::CodeTaken);
        }

        let created_at = tables.next_timestamp();
        let member = Member {
            id: new_member.id,
            email: new_member.email,
            full_name: new_member.full_name,
            brand_name: new_member.brand_name,
            referral_code: new_member.referral_code,
            created_at,
        };
        tables.members.push(member.clone());

        let referrer_exists = referrer_code.map_or(false, |code| {
            tables
                .members
                .iter()
                .any(|m| m.referral_code == code && m.id != member.id)
        });

        let mut referral = None;
        if let (Some(code), true) = (referrer_code, referrer_exists) {
            let already_referred = tables
                .referrals
                .iter()
                .any(|edge| edge.referred_member_id == member.id);
            if !already_referred {
                let edge = ReferralEdge {
                    id: Uuid::new_v4(),
                    referrer_code: code.to_string(),
                    referred_member_id: member.id,
                    created_at: tables.next_timestamp(),
                };
                tables.referrals.push(edge.clone());
                referral = Some(edge);
            }
        }

        Ok(CreateMemberOutcome::Created { member, referral })
    }

    async fn get_member_count(&self) -> Result<i64, StoreError> {
        Ok(self.tables().members.len() as i64)
    }
}

#[async_trait]
impl ReferralExt for MemoryStore {
    async fn get_referral_count(&self, referral_code: &str) -> Result<i64, StoreError> {
        Ok(self.tables().count_for(referral_code))
    }

    async fn get_referral_by_referee(
        &self,
        referee_id: Uuid,
    ) -> Result<Option<ReferralEdge>, StoreError> {
        Ok(self
            .tables()
            .referrals
            .iter()
            .find(|edge| edge.referred_member_id == referee_id)
            .cloned())
    }

    async fn get_recent_referrals(
        &self,
        referral_code: &str,
        limit: i64,
    ) -> Result<Vec<ReferredMember>, StoreError> {
        let tables = self.tables();
        let mut edges: Vec<&ReferralEdge> = tables
            .referrals
            .iter()
            .filter(|edge| edge.referrer_code == referral_code)
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let referees = edges
            .into_iter()
            .filter_map(|edge| {
                tables
                    .members
                    .iter()
                    .find(|m| m.id == edge.referred_member_id)
            })
            .take(limit.max(0) as usize)
            .map(|m| ReferredMember {
                full_name: m.full_name.clone(),
                brand_name: m.brand_name.clone(),
                email: m.email.clone(),
                joined_at: m.created_at,
            })
            .collect();
        Ok(referees)
    }

    async fn get_referral_tallies(&self, limit: i64) -> Result<Vec<MemberTally>, StoreError> {
        let tables = self.tables();
        let mut tallies: Vec<MemberTally> = tables
            .members
            .iter()
            .map(|m| MemberTally {
                member_id: m.id,
                full_name: m.full_name.clone(),
                brand_name: m.brand_name.clone(),
                referral_code: m.referral_code.clone(),
                referral_count: tables.count_for(&m.referral_code),
                created_at: m.created_at,
            })
            .collect();
        tallies.sort_by(|a, b| {
            b.referral_count
                .cmp(&a.referral_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.member_id.cmp(&b.member_id))
        });
        tallies.truncate(limit.max(0) as usize);
        Ok(tallies)
    }
}

#[async_trait]
impl LoginTokenExt for MemoryStore {
    async fn save_login_token(&self, token: LoginToken) -> Result<(), StoreError> {
        self.tables()
            .login_tokens
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn consume_login_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LoginToken>, StoreError> {
        let mut tables = self.tables();
        let Some(token) = tables.login_tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        if token.consumed_at.is_some() || token.expires_at <= now {
            return Ok(None);
        }
        token.consumed_at = Some(now);
        Ok(Some(token.clone()))
    }

    async fn purge_login_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let before = tables.login_tokens.len();
        tables
            .login_tokens
            .retain(|_, token| token.consumed_at.is_none() && token.expires_at > now);
        Ok((before - tables.login_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_member(email: &str, code: &str) -> NewMember {
        NewMember {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or_default().to_string(),
            brand_name: None,
            referral_code: code.to_string(),
        }
    }

    async fn create(store: &MemoryStore, email: &str, code: &str, referrer: Option<&str>) -> Member {
        match store.create_member(new_member(email, code), referrer).await.unwrap() {
            CreateMemberOutcome::Created { member, .. } => member,
            other => panic!("expected a new member, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let store = MemoryStore::new();
        create(&store, "ada@x.com", "AAAA0001", None).await;

        let outcome = store
            .create_member(new_member("ADA@x.com", "AAAA0002"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, CreateMemberOutcome::EmailTaken));
        assert_eq!(store.get_member_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn code_collision_is_reported() {
        let store = MemoryStore::new();
        create(&store, "ada@x.com", "AAAA0001", None).await;

        let outcome = store
            .create_member(new_member("bob@x.com", "AAAA0001"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, CreateMemberOutcome::CodeTaken));
    }

    #[tokio::test]
    async fn unknown_referrer_creates_no_edge() {
        let store = MemoryStore::new();
        create(&store, "ada@x.com", "AAAA0001", Some("NOPE0000")).await;
        assert!(store.referral_edges().is_empty());
    }

    #[tokio::test]
    async fn own_code_creates_no_edge() {
        let store = MemoryStore::new();
        create(&store, "ada@x.com", "AAAA0001", Some("AAAA0001")).await;
        assert!(store.referral_edges().is_empty());
    }

    #[tokio::test]
    async fn tallies_count_edges_live() {
        let store = MemoryStore::new();
        let ada = create(&store, "ada@x.com", "AAAA0001", None).await;
        create(&store, "bob@x.com", "BBBB0001", Some(&ada.referral_code)).await;
        create(&store, "cy@x.com", "CCCC0001", Some(&ada.referral_code)).await;

        let tallies = store.get_referral_tallies(10).await.unwrap();
        assert_eq!(tallies[0].member_id, ada.id);
        assert_eq!(tallies[0].referral_count, 2);
        assert_eq!(store.get_referral_count("AAAA0001").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn login_tokens_are_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save_login_token(LoginToken {
                token_hash: "hash".to_string(),
                member_id: Uuid::new_v4(),
                redirect_to: "https://qrew.test/dashboard".to_string(),
                expires_at: now + Duration::minutes(5),
                consumed_at: None,
            })
            .await
            .unwrap();

        assert!(store.consume_login_token("hash", now).await.unwrap().is_some());
        assert!(store.consume_login_token("hash", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_login_tokens_are_refused() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save_login_token(LoginToken {
                token_hash: "old".to_string(),
                member_id: Uuid::new_v4(),
                redirect_to: "https://qrew.test/dashboard".to_string(),
                expires_at: now - Duration::seconds(1),
                consumed_at: None,
            })
            .await
            .unwrap();

        assert!(store.consume_login_token("old", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_dead_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (hash, expires_at) in [
            ("used", now + Duration::minutes(5)),
            ("expired", now - Duration::seconds(1)),
            ("live", now + Duration::minutes(5)),
        ] {
            store
                .save_login_token(LoginToken {
                    token_hash: hash.to_string(),
                    member_id: Uuid::new_v4(),
                    redirect_to: "https://qrew.test/dashboard".to_string(),
                    expires_at,
                    consumed_at: None,
                })
                .await
                .unwrap();
        }
        store.consume_login_token("used", now).await.unwrap();

        assert_eq!(store.purge_login_tokens(now).await.unwrap(), 2);
        assert!(store.consume_login_token("live", now).await.unwrap().is_some());
        assert_eq!(store.purge_login_tokens(now).await.unwrap(), 1);
    }
}
