//! Disambiguation Resolver
//!
//! Turns free-text names into confirmed identities. Contacts and meeting
//! rooms each get a small family of flows ([`contacts`], [`rooms`]) that run
//! as sub-flows of a task and lean on the engine for suspend/resume, paging
//! and retry bounds.
//!
//! Candidate lists are owned by the resolver frame's options and die with
//! the frame. Only the finished result reaches [`ConversationState`].
//!
//! [`ConversationState`]: crate::state::ConversationState

pub mod contacts;
pub mod rooms;

use std::sync::LazyLock;

use regex::Regex;

use crate::dialog::{Choice, PageMove};
use crate::messages::{OutgoingMessage, Template};
use crate::services::CandidateIdentity;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w[-\w.+]*@([A-Za-z0-9][-A-Za-z0-9]*\.)+[A-Za-z]{2,14}$").unwrap()
});

/// Whether `text` is a usable address
#[must_use]
pub fn is_email(text: &str) -> bool {
    EMAIL_RE.is_match(text.trim())
}

/// Local part of an address
#[must_use]
pub fn local_part(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// Combine the three identity sources into one candidate list
///
/// A single work-with match with an address wins outright. Otherwise
/// same-name entries merge their addresses, addresses are deduplicated
/// across candidates case-insensitively and candidates left without an
/// address are dropped.
#[must_use]
pub fn merge_candidates(
    work_with: Vec<CandidateIdentity>,
    contacts: Vec<CandidateIdentity>,
    users: Vec<CandidateIdentity>,
) -> Vec<CandidateIdentity> {
    let usable = |c: &CandidateIdentity| c.addresses.iter().any(|a| is_email(a));
    let work_with: Vec<_> = work_with.into_iter().filter(usable).collect();
    if work_with.len() == 1 {
        return work_with;
    }

    let mut merged: Vec<CandidateIdentity> = Vec::new();
    for candidate in work_with.into_iter().chain(contacts).chain(users) {
        match merged
            .iter_mut()
            .find(|m| m.display_name.eq_ignore_ascii_case(&candidate.display_name))
        {
            Some(existing) => {
                existing.addresses.extend(candidate.addresses);
                existing.source = existing.source.min(candidate.source);
            }
            None => merged.push(candidate),
        }
    }

    let mut seen: Vec<String> = Vec::new();
    for candidate in &mut merged {
        candidate.addresses.retain(|address| {
            let key = address.trim().to_lowercase();
            if !is_email(&key) || seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
    }
    merged.retain(|c| !c.addresses.is_empty());
    merged
}

/// Half-open bounds of `page` in a list of `len` items
#[must_use]
pub fn page_bounds(len: usize, page: usize, page_size: usize) -> (usize, usize) {
    let start = (page * page_size).min(len);
    (start, (start + page_size).min(len))
}

/// Apply a page move
///
/// Moving past either end keeps the page and returns the message to send.
pub fn move_page(
    len: usize,
    page: &mut usize,
    page_size: usize,
    mv: PageMove,
) -> Option<OutgoingMessage> {
    match mv {
        PageMove::Next => {
            if (*page + 1) * page_size >= len {
                Some(OutgoingMessage::new(Template::AlreadyLastPage))
            } else {
                *page += 1;
                None
            }
        }
        PageMove::Previous => {
            if *page == 0 {
                Some(OutgoingMessage::new(Template::AlreadyFirstPage))
            } else {
                *page -= 1;
                None
            }
        }
    }
}

/// Choice with the usual synonyms: position, name, and address local part
#[must_use]
pub fn identity_choice(position: usize, label: &str, name: &str, address: Option<&str>) -> Choice {
    let mut synonyms = vec![(position + 1).to_string(), name.to_string()];
    if let Some(address) = address {
        synonyms.push(address.to_string());
        synonyms.push(local_part(address).to_string());
    }
    Choice::new(label, synonyms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::IdentitySource;
    use pretty_assertions::assert_eq;

    fn cand(name: &str, addresses: &[&str], source: IdentitySource) -> CandidateIdentity {
        CandidateIdentity::new(
            name,
            addresses.iter().map(ToString::to_string).collect(),
            source,
        )
    }

    #[test]
    fn test_email_check() {
        assert!(is_email("a@b.com"));
        assert!(is_email(" alex.w+cal@mail.contoso.co.uk "));
        assert!(!is_email("alex"));
        assert!(!is_email("alex@localhost"));
        assert!(!is_email("a@b.c"));
    }

    #[test]
    fn test_single_work_with_wins() {
        let merged = merge_candidates(
            vec![cand("Alex W", &["alexw@contoso.com"], IdentitySource::WorkWith)],
            vec![cand("Alex J", &["alexj@contoso.com"], IdentitySource::Contacts)],
            vec![],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].display_name, "Alex W");
    }

    #[test]
    fn test_merge_dedup_and_drop() {
        let merged = merge_candidates(
            vec![],
            vec![
                cand("Alex Wilber", &["alexw@contoso.com"], IdentitySource::Contacts),
                cand("Nobody", &["not-an-address"], IdentitySource::Contacts),
            ],
            vec![
                cand("alex wilber", &["AlexW@contoso.com", "awilber@fabrikam.com"], IdentitySource::Directory),
                cand("Alex Johnson", &["alexw@contoso.com"], IdentitySource::Directory),
            ],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].display_name, "Alex Wilber");
        assert_eq!(
            merged[0].addresses,
            vec!["alexw@contoso.com".to_string(), "awilber@fabrikam.com".to_string()]
        );
        assert_eq!(merged[0].source, IdentitySource::Contacts);
    }

    #[test]
    fn test_paging_clamps() {
        let mut page = 0;
        assert_eq!(
            move_page(7, &mut page, 3, PageMove::Previous).map(|m| m.template),
            Some(Template::AlreadyFirstPage)
        );
        assert!(move_page(7, &mut page, 3, PageMove::Next).is_none());
        assert!(move_page(7, &mut page, 3, PageMove::Next).is_none());
        assert_eq!(page, 2);
        assert_eq!(
            move_page(7, &mut page, 3, PageMove::Next).map(|m| m.template),
            Some(Template::AlreadyLastPage)
        );
        assert_eq!(page, 2);
        assert_eq!(page_bounds(7, page, 3), (6, 7));
    }

    #[test]
    fn test_identity_choice_synonyms() {
        let choice = identity_choice(1, "Alex Johnson: alexj@contoso.com", "Alex Johnson", Some("alexj@contoso.com"));
        assert_eq!(choice.synonyms, vec!["2", "Alex Johnson", "alexj@contoso.com", "alexj"]);
    }
}
