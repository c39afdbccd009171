// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Extends the driver with the operations on users.

use crate::db;
use crate::driver::Driver;
use crate::model::{ListOptions, User, UserList, UserRequest};
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};
use log::info;

/// Converts a database error on the user called `name` into a driver error.
fn map_user_error(e: DbError, name: &str) -> DriverError {
    DriverError::for_entity(e, "User", name)
}

impl Driver {
    /// Creates a new user out of a validated `request`.
    pub(crate) async fn create_user(self, mut request: UserRequest) -> DriverResult<User> {
        let password = request
            .take_password()
            .hash()
            .map_err(|e| DriverError::BackendError(e.to_string()))?;
        let name = request.metadata.name.clone();
        let user = request.into_user(password, self.clock.now_utc());

        let mut tx = self.db.begin().await?;
        let user = db::create_user(tx.ex(), user).await.map_err(|e| map_user_error(e, &name))?;
        tx.commit().await?;

        info!("Created user {} with instance ID {}", name, user.metadata().instance_id());
        Ok(user)
    }

    /// Gets the user called `name`.
    pub(crate) async fn get_user(self, name: String) -> DriverResult<User> {
        let mut ex = self.db.ex().await?;
        db::get_user(&mut ex, &name).await.map_err(|e| map_user_error(e, &name))
    }

    /// Updates the profile of the user called `name` with the contents of `request`.
    ///
    /// Only the nickname, email, phone and extend fields are taken from the request.
    pub(crate) async fn update_user(self, name: String, request: UserRequest) -> DriverResult<User> {
        let mut tx = self.db.begin().await?;

        let user = db::get_user(tx.ex(), &name).await.map_err(|e| map_user_error(e, &name))?;
        let user = user.apply_update(request, self.clock.now_utc());
        if let Err(errors) = user.validate_update() {
            return Err(DriverError::invalid_fields(errors));
        }
        db::update_user(tx.ex(), &user).await.map_err(|e| map_user_error(e, &name))?;

        tx.commit().await?;
        Ok(user)
    }

    /// Deletes the user called `name`, if it exists.
    pub(crate) async fn delete_user(self, name: String) -> DriverResult<()> {
        let mut ex = self.db.ex().await?;
        db::delete_user(&mut ex, &name).await?;
        Ok(())
    }

    /// Deletes all users whose names are in `names`.
    pub(crate) async fn delete_users(self, names: Vec<String>) -> DriverResult<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        let deleted = db::delete_users(tx.ex(), &names).await?;
        tx.commit().await?;

        info!("Deleted {} users out of {} requested", deleted, names.len());
        Ok(())
    }

    /// Gets the page of users described by `opts`.
    pub(crate) async fn list_users(self, opts: ListOptions) -> DriverResult<UserList> {
        let mut ex = self.db.ex().await?;
        Ok(db::list_users(&mut ex, &opts).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::{Extend, Password, RequestMeta};
    use iii_iv_core::model::Selector;

    /// Creates a valid request to create a user called `name`.
    fn create_request(name: &str) -> UserRequest {
        UserRequest {
            metadata: RequestMeta { name: name.to_owned(), extend: Extend::default() },
            nickname: "Colin".to_owned(),
            password: Password::from("Admin@2021"),
            email: "colin@foxmail.com".to_owned(),
            phone: "1812884xxxx".to_owned(),
            is_admin: 1,
        }
    }

    #[tokio::test]
    async fn test_create_user_ok() {
        let context = TestContext::setup().await;

        let user = context.driver().create_user(create_request("colin")).await.unwrap();
        assert_eq!("colin", user.metadata().name());
        assert_eq!(&format!("user-{}", user.metadata().id()), user.metadata().instance_id());
        assert!(Password::from("Admin@2021").verify(user.password()).unwrap());

        let stored = db::get_user(&mut context.ex().await, "colin").await.unwrap();
        assert_eq!(user, stored);
        assert_eq!("1812884xxxx", stored.phone());
        assert_eq!(1, *stored.is_admin());
    }

    #[tokio::test]
    async fn test_create_user_already_exists() {
        let context = TestContext::setup().await;

        context.create_user("colin").await;
        assert_eq!(
            DriverError::AlreadyExists("User colin already exists".to_owned()),
            context.driver().create_user(create_request("colin")).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_get_user() {
        let context = TestContext::setup().await;

        let user = context.create_user("colin").await;
        assert_eq!(user, context.driver().get_user("colin".to_owned()).await.unwrap());
        assert_eq!(
            DriverError::NotFound("User other not found".to_owned()),
            context.driver().get_user("other".to_owned()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_update_user_ok() {
        let context = TestContext::setup().await;

        let user = context.create_user("colin").await;

        let mut extend = Extend::new();
        extend.insert("a".to_owned(), serde_json::Value::from(true));
        let request = UserRequest {
            metadata: RequestMeta { name: "renamed".to_owned(), extend: extend.clone() },
            nickname: "New".to_owned(),
            password: Password::from("ignored"),
            email: "new@example.com".to_owned(),
            phone: "42".to_owned(),
            is_admin: 1,
        };
        let updated = context.driver().update_user("colin".to_owned(), request).await.unwrap();

        assert_eq!("colin", updated.metadata().name());
        assert_eq!("New", updated.nickname());
        assert_eq!("new@example.com", updated.email());
        assert_eq!("42", updated.phone());
        assert_eq!(&extend, updated.metadata().extend());
        assert_eq!(0, *updated.is_admin());
        assert_eq!(user.password(), updated.password());
        assert!(updated.metadata().updated_at() > user.metadata().updated_at());

        assert_eq!(updated, db::get_user(&mut context.ex().await, "colin").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_user_not_found() {
        let context = TestContext::setup().await;

        let request = create_request("ghost");
        assert_eq!(
            DriverError::NotFound("User ghost not found".to_owned()),
            context.driver().update_user("ghost".to_owned(), request).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_update_user_invalid() {
        let context = TestContext::setup().await;

        let user = context.create_user("colin").await;
        let request = UserRequest { email: "bad".to_owned(), ..Default::default() };
        match context.driver().update_user("colin".to_owned(), request).await.unwrap_err() {
            DriverError::InvalidInput(msg) => {
                assert!(msg.starts_with("nickname: Required value; email: Invalid value"), "{}", msg)
            }
            e => panic!("{:?}", e),
        }

        assert_eq!(user, db::get_user(&mut context.ex().await, "colin").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let context = TestContext::setup().await;

        context.create_user("colin").await;
        context.driver().delete_user("colin".to_owned()).await.unwrap();
        context.driver().delete_user("colin".to_owned()).await.unwrap();

        db::get_user(&mut context.ex().await, "colin").await.unwrap_err();
    }

    #[tokio::test]
    async fn test_delete_users() {
        let context = TestContext::setup().await;

        context.create_user("a").await;
        context.create_user("b").await;
        context.create_user("c").await;

        context.driver().delete_users(vec![]).await.unwrap();
        context.driver().delete_users(vec!["a".to_owned(), "c".to_owned()]).await.unwrap();

        let list = context.driver().list_users(ListOptions::default()).await.unwrap();
        assert_eq!(1, *list.total_count());
        assert_eq!("b", list.items()[0].metadata().name());
    }

    #[tokio::test]
    async fn test_list_users() {
        let context = TestContext::setup().await;

        context.create_user("admin").await;
        context.create_user("colin").await;
        context.create_user("admin2").await;

        let opts = ListOptions {
            selector: Selector::parse("name=admin").unwrap(),
            offset: 0,
            limit: 1,
        };
        let list = context.driver().list_users(opts).await.unwrap();
        assert_eq!(2, *list.total_count());
        assert_eq!(1, list.items().len());
        assert_eq!("admin2", list.items()[0].metadata().name());
    }
}
