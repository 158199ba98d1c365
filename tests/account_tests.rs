use chrono::Duration;
use rbac_admin::{
    Accounts, AppConfig, AppError, MemoryRepository, MockMailer, Notifier, Tokens,
    accounts::RESET_REQUESTED_MESSAGE,
    mailer::MailerState,
    models::{
        ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, NewRole, PermissionInput,
        RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, UserChanges,
    },
    oauth::GoogleProfile,
    repository::RepositoryState,
};
use std::sync::Arc;

// --- Helpers ---

struct Harness {
    accounts: Accounts,
    repo: RepositoryState,
    tokens: Tokens,
    mailer: Arc<MockMailer>,
}

async fn harness_with(mailer: MockMailer, with_default_role: bool) -> Harness {
    let config = AppConfig {
        admin_notify_email: Some("ops@example.com".to_string()),
        ..AppConfig::default()
    };
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    if with_default_role {
        repo.create_role(NewRole {
            name: "Admin".to_string(),
            description: "Admin role".to_string(),
            is_default: true,
            permissions: vec![PermissionInput::new("dashboard", &["read"])],
        })
        .await
        .unwrap();
    }
    let mailer = Arc::new(mailer);
    let tokens = Tokens::from_config(&config);
    let notifier = Notifier::new(mailer.clone() as MailerState, &config);
    Harness {
        accounts: Accounts::new(repo.clone(), tokens.clone(), notifier, &config),
        repo,
        tokens,
        mailer,
    }
}

async fn harness() -> Harness {
    harness_with(MockMailer::new(), true).await
}

fn registration(email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    }
}

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

// --- Registration ---

#[tokio::test]
async fn test_register_assigns_default_role_and_signs_in() {
    let h = harness().await;
    let session = h
        .accounts
        .register(&registration("  Ada@Example.com ", "secret-1"))
        .await
        .unwrap();

    assert_eq!(session.message, "User registered successfully");
    assert_eq!(session.user.email, "ada@example.com");
    assert_eq!(session.user.role.as_ref().unwrap().name, "Admin");
    assert_eq!(h.tokens.session.verify(&session.token), Ok(session.user.id));

    let stored = h.repo.get_user(session.user.id).await.unwrap().unwrap();
    let hash = stored.password_hash.unwrap();
    assert_ne!(hash, "secret-1");
    assert!(hash.starts_with("$2"));
}

#[tokio::test]
async fn test_register_twice_is_duplicate_email() {
    let h = harness().await;
    h.accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let mut again = registration("ADA@example.com", "other-password");
    again.first_name = "Someone".to_string();
    again.last_name = "Else".to_string();

    let err = h.accounts.register(&again).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateEmail));
    assert_eq!(err.client_message(), "User already exists");
}

#[tokio::test]
async fn test_register_without_default_role_fails() {
    let h = harness_with(MockMailer::new(), false).await;
    let err = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoDefaultRole));
    assert!(h.repo.find_user_by_email("ada@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_register_sends_welcome_and_admin_mail() {
    let h = harness().await;
    h.accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Welcome to Admin API");
    assert!(sent[0].html.contains("Dear Ada"));
    assert_eq!(sent[1].to, "ops@example.com");
    assert!(sent[1].html.contains("ada@example.com"));
}

#[tokio::test]
async fn test_registration_details_are_escaped_in_mail_bodies() {
    let h = harness().await;
    h.accounts
        .register(&RegisterRequest {
            first_name: r#"<a href="https://phish.example">Click</a>"#.to_string(),
            ..registration("ada@example.com", "secret-1")
        })
        .await
        .unwrap();

    let sent = h.mailer.sent();
    let admin_mail = sent.iter().find(|m| m.to == "ops@example.com").unwrap();
    assert!(!admin_mail.html.contains("<a href"));
    assert!(admin_mail.html.contains("&lt;a href=&quot;https://phish.example&quot;&gt;Click&lt;/a&gt;"));
    assert!(!sent[0].html.contains("<a href"));
}

#[tokio::test]
async fn test_mail_failure_never_fails_registration() {
    let h = harness_with(MockMailer::failing(), true).await;
    let session = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    assert_eq!(session.user.email, "ada@example.com");
}

#[tokio::test]
async fn test_register_validates_payload() {
    let h = harness().await;
    for request in [
        registration("not-an-email", "secret-1"),
        registration("ada@example.com", "12345"),
        RegisterRequest {
            first_name: "  ".to_string(),
            ..registration("ada@example.com", "secret-1")
        },
    ] {
        assert!(matches!(
            h.accounts.register(&request).await,
            Err(AppError::Validation(_))
        ));
    }
}

// --- Login ---

#[tokio::test]
async fn test_login_success() {
    let h = harness().await;
    let registered = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let session = h.accounts.login(&login("Ada@Example.com", "secret-1")).await.unwrap();
    assert_eq!(session.message, "Login successful");
    assert_eq!(session.user.id, registered.user.id);
    assert_eq!(h.tokens.session.verify(&session.token), Ok(registered.user.id));
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
    let h = harness().await;
    h.accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let unknown = h
        .accounts
        .login(&login("x@example.com", "secret-1"))
        .await
        .unwrap_err();
    let wrong = h
        .accounts
        .login(&login("ada@example.com", "wrong-password"))
        .await
        .unwrap_err();

    assert!(matches!(unknown, AppError::InvalidCredentials));
    assert!(matches!(wrong, AppError::InvalidCredentials));
    assert_eq!(unknown.status(), wrong.status());
    assert_eq!(unknown.client_message(), wrong.client_message());
    assert_eq!(unknown.client_message(), "Invalid credentials");
}

#[tokio::test]
async fn test_deactivated_account_cannot_login() {
    let h = harness().await;
    let registered = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    h.repo
        .update_user(
            registered.user.id,
            UserChanges {
                is_active: Some(false),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        h.accounts.login(&login("ada@example.com", "secret-1")).await,
        Err(AppError::InvalidCredentials)
    ));
}

// --- OAuth ---

#[tokio::test]
async fn test_oauth_login_creates_then_reuses_account() {
    let h = harness().await;
    let profile = GoogleProfile {
        google_id: "google-sub-1".to_string(),
        email: "Grace@Example.com".to_string(),
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
    };

    let first = h.accounts.oauth_login(profile.clone()).await.unwrap();
    assert_eq!(first.message, "Google login successful");
    assert_eq!(first.user.email, "grace@example.com");
    assert_eq!(first.user.role.as_ref().unwrap().name, "Admin");

    let stored = h.repo.get_user(first.user.id).await.unwrap().unwrap();
    assert!(stored.password_hash.is_none());

    let second = h.accounts.oauth_login(profile).await.unwrap();
    assert_eq!(second.user.id, first.user.id);
    assert_eq!(h.repo.list_users().await.unwrap().len(), 1);

    // No password exists, so password login is refused.
    assert!(matches!(
        h.accounts.login(&login("grace@example.com", "anything")).await,
        Err(AppError::InvalidCredentials)
    ));
}

// --- Profile & password change ---

#[tokio::test]
async fn test_update_profile_rejects_email_of_another_user() {
    let h = harness().await;
    let ada = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    h.accounts
        .register(&registration("bob@example.com", "secret-1"))
        .await
        .unwrap();

    let err = h
        .accounts
        .update_profile(
            ada.user.id,
            &UpdateProfileRequest {
                email: Some("bob@example.com".to_string()),
                ..UpdateProfileRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateEmail));

    let updated = h
        .accounts
        .update_profile(
            ada.user.id,
            &UpdateProfileRequest {
                first_name: Some("Augusta".to_string()),
                ..UpdateProfileRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.user.first_name, "Augusta");
    assert_eq!(updated.user.email, "ada@example.com");
}

#[tokio::test]
async fn test_change_password_flow() {
    let h = harness().await;
    let ada = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let err = h
        .accounts
        .change_password(
            ada.user.id,
            &ChangePasswordRequest {
                current_password: "not-it".to_string(),
                new_password: "secret-2".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IncorrectPassword));

    h.accounts
        .change_password(
            ada.user.id,
            &ChangePasswordRequest {
                current_password: "secret-1".to_string(),
                new_password: "secret-2".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(h.accounts.login(&login("ada@example.com", "secret-1")).await.is_err());
    assert!(h.accounts.login(&login("ada@example.com", "secret-2")).await.is_ok());
    assert!(
        h.mailer
            .sent()
            .iter()
            .any(|m| m.subject == "Password Changed Notification")
    );
}

#[tokio::test]
async fn test_change_password_for_vanished_user_is_not_found() {
    let h = harness().await;
    let ada = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    h.repo.delete_user(ada.user.id).await.unwrap();

    let err = h
        .accounts
        .change_password(
            ada.user.id,
            &ChangePasswordRequest {
                current_password: "secret-1".to_string(),
                new_password: "secret-2".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("User")));
}

// --- Password reset ---

#[tokio::test]
async fn test_forgot_password_answers_the_same_for_unknown_email() {
    let h = harness().await;
    h.accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    let before = h.mailer.sent().len();

    let known = h
        .accounts
        .request_password_reset(&ForgotPasswordRequest {
            email: "ada@example.com".to_string(),
        })
        .await
        .unwrap();
    let unknown = h
        .accounts
        .request_password_reset(&ForgotPasswordRequest {
            email: "nobody@example.com".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(known.message, RESET_REQUESTED_MESSAGE);
    assert_eq!(unknown.message, RESET_REQUESTED_MESSAGE);

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), before + 1);
    let reset_mail = sent.last().unwrap();
    assert_eq!(reset_mail.subject, "Password Reset Request");
    assert!(reset_mail.html.contains("http://localhost:3000/reset-password?token="));
    assert!(reset_mail.html.contains("expire in 1 hours"));
}

#[tokio::test]
async fn test_forgot_password_succeeds_even_when_mail_fails() {
    let h = harness_with(MockMailer::failing(), true).await;
    h.accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let answer = h
        .accounts
        .request_password_reset(&ForgotPasswordRequest {
            email: "ada@example.com".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(answer.message, RESET_REQUESTED_MESSAGE);
}

#[tokio::test]
async fn test_reset_password_with_valid_token() {
    let h = harness().await;
    let ada = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();
    let token = h.tokens.reset.issue(ada.user.id).unwrap();

    h.accounts
        .reset_password(&ResetPasswordRequest {
            token,
            new_password: "brand-new".to_string(),
        })
        .await
        .unwrap();

    assert!(h.accounts.login(&login("ada@example.com", "brand-new")).await.is_ok());
}

#[tokio::test]
async fn test_reset_password_rejects_session_and_expired_tokens() {
    let h = harness().await;
    let ada = h
        .accounts
        .register(&registration("ada@example.com", "secret-1"))
        .await
        .unwrap();

    let expired = h
        .tokens
        .reset
        .issue_with_ttl(ada.user.id, Duration::seconds(-1))
        .unwrap();
    for token in [ada.token.clone(), expired, "garbage".to_string()] {
        let err = h
            .accounts
            .reset_password(&ResetPasswordRequest {
                token,
                new_password: "brand-new".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
    }

    // The original password still works.
    assert!(h.accounts.login(&login("ada@example.com", "secret-1")).await.is_ok());
}
