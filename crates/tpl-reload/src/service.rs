use async_trait::async_trait;
use tpl_rpc::{methods, RpcClient, REPLY_OK};

use crate::error::{ReloadError, ReloadResult};
use crate::plan::InvalidationPlan;

/// The cache service: reloads entries and drops filter indexes.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn reload_cache(&self, plan: &InvalidationPlan) -> ReloadResult<()>;
    async fn clear_indexes(&self, keys: &[String]) -> ReloadResult<()>;
}

/// The scheduler: re-reads action plans.
#[async_trait]
pub trait SchedulerService: Send + Sync {
    async fn reload_scheduler(&self) -> ReloadResult<()>;
}

/// The users service: re-reads user profiles.
#[async_trait]
pub trait UsersService: Send + Sync {
    async fn reload_users(&self) -> ReloadResult<()>;
}

fn expect_ok(method: &'static str, reply: String) -> ReloadResult<()> {
    if reply == REPLY_OK {
        Ok(())
    } else {
        Err(ReloadError::UnexpectedReply { method, reply })
    }
}

#[async_trait]
impl CacheService for RpcClient {
    async fn reload_cache(&self, plan: &InvalidationPlan) -> ReloadResult<()> {
        let reply: String = self.call(methods::RELOAD_CACHE, &plan.to_args()).await?;
        expect_ok(methods::RELOAD_CACHE, reply)
    }

    async fn clear_indexes(&self, keys: &[String]) -> ReloadResult<()> {
        let reply: String = self.call(methods::CLEAR_CACHE, keys).await?;
        expect_ok(methods::CLEAR_CACHE, reply)
    }
}

#[async_trait]
impl SchedulerService for RpcClient {
    async fn reload_scheduler(&self) -> ReloadResult<()> {
        let reply: String = self.call(methods::RELOAD_SCHEDULER, "").await?;
        expect_ok(methods::RELOAD_SCHEDULER, reply)
    }
}

#[async_trait]
impl UsersService for RpcClient {
    async fn reload_users(&self) -> ReloadResult<()> {
        let reply: String = self.call(methods::RELOAD_USERS, "").await?;
        expect_ok(methods::RELOAD_USERS, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_is_success() {
        assert!(expect_ok(methods::RELOAD_USERS, "OK".into()).is_ok());
        let err = expect_ok(methods::RELOAD_USERS, "PARTIAL".into()).unwrap_err();
        assert!(matches!(err, ReloadError::UnexpectedReply { reply, .. } if reply == "PARTIAL"));
    }
}
