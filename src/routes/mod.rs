/// Router Module Index
///
/// Routes are split by access level, and each level is enforced by a layer rather than
/// inside handlers:
///
/// - `public`: no identity required.
/// - `authenticated`: behind the authentication gate.
/// - `admin`: behind the gate plus a per-route `(module, action)` permission check.

/// Auth flows: registration, login, password reset, Google sign-in.
pub mod public;

/// The caller's own profile. Requires a valid session token.
pub mod authenticated;

/// Role and user administration, guarded per route by the permission engine.
pub mod admin;
