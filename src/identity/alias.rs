//! Alias email derivation
//!
//! `a@b.com` with discriminator `STU02` becomes `a+STU02@b.com`. Addresses
//! without a usable local part get the tag appended instead.

use crate::types::StudentProfile;

/// Insert `+<tag>` before the first `@`, or append it when there is no `@`
/// after a non-empty local part
pub fn alias_email(email: &str, tag: &str) -> String {
    match email.find('@') {
        Some(at) if at > 0 => format!("{}+{}{}", &email[..at], tag, &email[at..]),
        _ => format!("{email}+{tag}"),
    }
}

/// Alias candidates for a profile, in the order they are tried.
///
/// The first tags the email with the trimmed external id (or the profile id
/// when the external id is blank). The second also carries the profile id,
/// which is unique, so the list always ends in an address no other profile
/// can derive.
pub fn alias_candidates(profile: &StudentProfile) -> Vec<String> {
    let profile_tag = profile.id.0.as_str();
    match profile.login_secret() {
        Some(external_id) => vec![
            alias_email(&profile.email, external_id),
            alias_email(&profile.email, &format!("{external_id}.{profile_tag}")),
        ],
        None => vec![alias_email(&profile.email, profile_tag)],
    }
}

/// Whether `email` is one of the aliases this profile may hold
pub fn is_alias_of(profile: &StudentProfile, email: &str) -> bool {
    alias_candidates(profile)
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(email))
}
