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

//! The `User` data type and the requests that create and modify it.

use crate::model::{Extend, HashedPassword, Password};
use derive_getters::Getters;
use iii_iv_core::model::validation::{FieldErrors, is_email_address, qualified_name_errors};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Prefix of the instance identifiers assigned to users.
const INSTANCE_ID_PREFIX: &str = "user-";

/// Maximum length of a nickname.
const MAX_NICKNAME_LENGTH: usize = 30;

/// Maximum length of an email address.
const MAX_EMAIL_LENGTH: usize = 100;

/// Computes the instance identifier of an object with numeric `id` by appending the base-36
/// representation of the id to `prefix`.
pub fn instance_id(prefix: &str, id: i64) -> String {
    /// Alphabet of the base-36 representation.
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut n = id.unsigned_abs();
    let mut digits = vec![];
    loop {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.reverse();

    let mut result = String::with_capacity(prefix.len() + digits.len() + 1);
    result.push_str(prefix);
    if id < 0 {
        result.push('-');
    }
    result.extend(digits.into_iter().map(char::from));
    result
}

/// Standard metadata of a persisted object.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Unique numeric identifier assigned by the database.
    id: i64,

    /// Unique textual identifier derived from `id`.
    #[serde(rename = "instanceID")]
    instance_id: String,

    /// Unique name of the object.
    name: String,

    /// Free-form properties attached to the object.
    #[serde(default)]
    extend: Extend,

    /// Time at which the object was created.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    /// Time at which the object was last modified.
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

/// Representation of a user account.
///
/// The password hash is never serialized so that it cannot leak into responses.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity and bookkeeping details of the user.
    metadata: ObjectMeta,

    /// Display name of the user.
    nickname: String,

    /// Hash of the password of the user.
    #[serde(skip)]
    password: HashedPassword,

    /// Email address of the user.
    email: String,

    /// Phone number of the user, possibly empty.
    phone: String,

    /// Whether the user is an administrator, as 0 or 1.
    is_admin: i32,
}

impl User {
    /// Creates a new user that has not been persisted yet.
    ///
    /// The identifiers of the user are left unset until `with_id` is called.
    pub fn new<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        name: S1,
        nickname: S2,
        password: HashedPassword,
        email: S3,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            metadata: ObjectMeta {
                id: 0,
                instance_id: String::new(),
                name: name.into(),
                extend: Extend::default(),
                created_at: now,
                updated_at: now,
            },
            nickname: nickname.into(),
            password,
            email: email.into(),
            phone: String::new(),
            is_admin: 0,
        }
    }

    /// Modifies a user to set its numeric `id` and the instance identifier derived from it.
    pub fn with_id(mut self, id: i64) -> Self {
        self.metadata.id = id;
        self.metadata.instance_id = instance_id(INSTANCE_ID_PREFIX, id);
        self
    }

    /// Modifies a user to set an explicit instance identifier, as read from storage.
    pub(crate) fn with_instance_id<S: Into<String>>(mut self, instance_id: S) -> Self {
        self.metadata.instance_id = instance_id.into();
        self
    }

    /// Modifies a user to set its free-form properties.
    pub fn with_extend(mut self, extend: Extend) -> Self {
        self.metadata.extend = extend;
        self
    }

    /// Modifies a user to set its last modification time.
    pub fn with_updated_at(mut self, updated_at: OffsetDateTime) -> Self {
        self.metadata.updated_at = updated_at;
        self
    }

    /// Modifies a user to set its phone number.
    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = phone.into();
        self
    }

    /// Modifies a user to set its administrator flag.
    pub fn with_is_admin(mut self, is_admin: i32) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Replaces the mutable profile fields of the user with those in `request`.
    ///
    /// The name, the password and the identifiers of the user are not modified.
    pub fn apply_update(mut self, request: UserRequest, now: OffsetDateTime) -> Self {
        self.nickname = request.nickname;
        self.email = request.email;
        self.phone = request.phone;
        self.metadata.extend = request.metadata.extend;
        self.metadata.updated_at = now;
        self
    }

    /// Validates the profile fields of the user, ignoring the password.
    pub fn validate_update(&self) -> Result<(), Vec<String>> {
        let mut errors = FieldErrors::default();
        validate_profile(
            &mut errors,
            &self.metadata.name,
            &self.nickname,
            &self.email,
            self.is_admin,
        );
        errors.into_result()
    }
}

/// Metadata accepted in requests that create or modify an object.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(test, derive(Clone, Serialize))]
pub struct RequestMeta {
    /// Requested name of the object.
    pub name: String,

    /// Requested free-form properties of the object.
    pub extend: Extend,
}

/// Body of the requests that create or modify a user.
///
/// All fields are optional at deserialization time so that validation can report every missing
/// field at once.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(test, derive(Clone, Serialize))]
pub struct UserRequest {
    /// Identity of the user.
    pub metadata: RequestMeta,

    /// Display name of the user.
    pub nickname: String,

    /// Password of the user in plain text.
    pub password: Password,

    /// Email address of the user.
    pub email: String,

    /// Phone number of the user.
    pub phone: String,

    /// Whether the user is an administrator, as 0 or 1.
    pub is_admin: i32,
}

impl UserRequest {
    /// Validates all fields of a creation request, including the password.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = FieldErrors::default();
        validate_profile(
            &mut errors,
            &self.metadata.name,
            &self.nickname,
            &self.email,
            self.is_admin,
        );
        if self.password.is_empty() {
            errors.push("password", "Required value");
        } else if let Some(detail) = self.password.weakness() {
            errors.push("password", detail);
        }
        errors.into_result()
    }

    /// Converts a validated creation request into a new user with the given hashed `password`.
    pub fn into_user(self, password: HashedPassword, now: OffsetDateTime) -> User {
        User::new(self.metadata.name, self.nickname, password, self.email, now)
            .with_extend(self.metadata.extend)
            .with_phone(self.phone)
            .with_is_admin(self.is_admin)
    }

    /// Takes the plain text password out of the request.
    pub fn take_password(&mut self) -> Password {
        std::mem::take(&mut self.password)
    }
}

/// Records into `errors` all problems with the fields shared by creations and updates.
fn validate_profile(
    errors: &mut FieldErrors,
    name: &str,
    nickname: &str,
    email: &str,
    is_admin: i32,
) {
    for detail in qualified_name_errors(name) {
        errors.invalid("metadata.name", name, detail);
    }

    if errors.required("nickname", nickname) {
        errors.length("nickname", nickname, 1, MAX_NICKNAME_LENGTH);
    }

    if errors.required("email", email) {
        if !is_email_address(email) {
            errors.invalid("email", email, "must be a valid email address");
        }
        errors.length("email", email, 1, MAX_EMAIL_LENGTH);
    }

    if is_admin != 0 && is_admin != 1 {
        errors.invalid("isAdmin", &is_admin.to_string(), "must be 0 or 1");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iii_iv_core::clocks::testutils::utc_datetime;
    use serde_test::{Token, assert_ser_tokens};

    /// Creates a request that passes all validation checks.
    fn valid_request() -> UserRequest {
        UserRequest {
            metadata: RequestMeta { name: "colin".to_owned(), extend: Extend::default() },
            nickname: "Colin".to_owned(),
            password: Password::from("Admin@2021"),
            email: "colin@foxmail.com".to_owned(),
            phone: "1812884xxxx".to_owned(),
            is_admin: 0,
        }
    }

    #[test]
    fn test_instance_id() {
        assert_eq!("user-0", instance_id("user-", 0));
        assert_eq!("user-z", instance_id("user-", 35));
        assert_eq!("user-10", instance_id("user-", 36));
        assert_eq!("user-rs", instance_id("user-", 1000));
        assert_eq!("x--1", instance_id("x-", -1));
    }

    #[test]
    fn test_user_with_id() {
        let now = utc_datetime(2023, 5, 1, 10, 0, 0);
        let user = User::new("a", "b", HashedPassword::new("h"), "a@example.com", now).with_id(37);
        assert_eq!(37, *user.metadata().id());
        assert_eq!("user-11", user.metadata().instance_id());
    }

    #[test]
    fn test_user_serialization_hides_password() {
        let now = utc_datetime(2023, 5, 1, 10, 0, 0);
        let mut extend = Extend::new();
        extend.insert("k".to_owned(), serde_json::Value::from("v"));
        let user = User::new("colin", "Colin", HashedPassword::new("secret-hash"), "c@x.com", now)
            .with_id(1)
            .with_extend(extend)
            .with_is_admin(1);

        assert_ser_tokens(
            &user,
            &[
                Token::Struct { name: "User", len: 5 },
                Token::Str("metadata"),
                Token::Struct { name: "ObjectMeta", len: 6 },
                Token::Str("id"),
                Token::I64(1),
                Token::Str("instanceID"),
                Token::Str("user-1"),
                Token::Str("name"),
                Token::Str("colin"),
                Token::Str("extend"),
                Token::Map { len: Some(1) },
                Token::Str("k"),
                Token::Str("v"),
                Token::MapEnd,
                Token::Str("createdAt"),
                Token::Str("2023-05-01T10:00:00Z"),
                Token::Str("updatedAt"),
                Token::Str("2023-05-01T10:00:00Z"),
                Token::StructEnd,
                Token::Str("nickname"),
                Token::Str("Colin"),
                Token::Str("email"),
                Token::Str("c@x.com"),
                Token::Str("phone"),
                Token::Str(""),
                Token::Str("isAdmin"),
                Token::I32(1),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn test_request_deserialization() {
        let request: UserRequest = serde_json::from_str(
            r#"{"metadata":{"name":"colin","extend":{"a":"b"}},"nickname":"Colin",
            "password":"Admin@2021","email":"colin@foxmail.com","isAdmin":1}"#,
        )
        .unwrap();
        assert_eq!("colin", request.metadata.name);
        assert_eq!(Some(&serde_json::Value::from("b")), request.metadata.extend.get("a"));
        assert_eq!(Password::from("Admin@2021"), request.password);
        assert_eq!("", request.phone);
        assert_eq!(1, request.is_admin);
    }

    #[test]
    fn test_validate_ok() {
        valid_request().validate().unwrap();
    }

    #[test]
    fn test_validate_aggregates_all_errors() {
        let request = UserRequest {
            metadata: RequestMeta { name: "-bad".to_owned(), extend: Extend::default() },
            email: "not-an-email".to_owned(),
            is_admin: 7,
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        assert_eq!(5, errors.len(), "{:?}", errors);
        assert!(errors[0].starts_with("metadata.name: Invalid value: \"-bad\""));
        assert_eq!("nickname: Required value", errors[1]);
        assert!(errors[2].starts_with("email: Invalid value: \"not-an-email\""));
        assert!(errors[3].starts_with("isAdmin: Invalid value: \"7\""));
        assert_eq!("password: Required value", errors[4]);
    }

    #[test]
    fn test_validate_weak_password() {
        let request = UserRequest { password: Password::from("weak"), ..valid_request() };
        let errors = request.validate().unwrap_err();
        assert_eq!(vec!["password: must have between 8 and 16 characters".to_owned()], errors);
    }

    #[test]
    fn test_validate_lengths() {
        let request = UserRequest { nickname: "n".repeat(31), ..valid_request() };
        let errors = request.validate().unwrap_err();
        assert_eq!(vec!["nickname: Too long: must have at most 30 characters".to_owned()], errors);
    }

    #[test]
    fn test_apply_update_keeps_identity_and_password() {
        let created = utc_datetime(2023, 5, 1, 10, 0, 0);
        let updated = utc_datetime(2023, 5, 2, 10, 0, 0);
        let user = User::new("colin", "Colin", HashedPassword::new("hash"), "c@x.com", created)
            .with_id(5)
            .with_phone("123");

        let mut request = valid_request();
        request.metadata.name = "ignored".to_owned();
        request.nickname = "Colin2".to_owned();
        request.phone = String::new();
        let user = user.apply_update(request, updated);

        assert_eq!("colin", user.metadata().name());
        assert_eq!(5, *user.metadata().id());
        assert_eq!("Colin2", user.nickname());
        assert_eq!("colin@foxmail.com", user.email());
        assert_eq!("", user.phone());
        assert_eq!(&HashedPassword::new("hash"), user.password());
        assert_eq!(&created, user.metadata().created_at());
        assert_eq!(&updated, user.metadata().updated_at());
        user.validate_update().unwrap();
    }

    #[test]
    fn test_validate_update_ignores_password() {
        let now = utc_datetime(2023, 5, 1, 10, 0, 0);
        let user = User::new("colin", "", HashedPassword::default(), "bad", now);
        let errors = user.validate_update().unwrap_err();
        assert_eq!(2, errors.len(), "{:?}", errors);
        assert!(errors.iter().all(|e| !e.starts_with("password")));
    }
}
