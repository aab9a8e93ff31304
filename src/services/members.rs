//! Member service

use std::sync::Arc;

use validator::Validate;

use crate::{
    clock::Clock,
    error::AppResult,
    models::member::{CreateMember, Member},
    repository::Repository,
};

#[derive(Clone)]
pub struct MembersService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl MembersService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn get_member(&self, id: i64) -> AppResult<Member> {
        self.repository.members.get_by_id(id).await
    }

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.repository.members.list().await
    }

    pub async fn create_member(&self, member: CreateMember) -> AppResult<Member> {
        member.validate()?;
        let created = self.repository.members.create(&member, self.clock.now()).await?;
        tracing::info!(member_id = created.id, "Member created");
        Ok(created)
    }
}
