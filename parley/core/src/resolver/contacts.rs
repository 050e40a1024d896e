//! Contact resolution flows
//!
//! `FindContact` collects a list of names, `ResolveName` turns the name at
//! the cursor into one attendee, and `SelectPerson` / `SelectEmail` page
//! through ambiguous results. `ResolveName` replaces itself to move along
//! the list, so the parent only sees the end of the whole list.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{identity_choice, is_email, merge_candidates, move_page, page_bounds};
use crate::dialog::prompt::is_skip;
use crate::dialog::{
    Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext,
};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::services::CandidateIdentity;
use crate::state::{Attendee, ConversationState, PronounKind};

static NAME_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|;|&|\band\b)\s*").unwrap());

const MANAGER_WORDS: &[&str] = &["manager", "boss", "supervisor"];

/// Split "Alex, Megan and Lee" into names
#[must_use]
pub fn split_names(text: &str) -> Vec<String> {
    NAME_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Cursor shared by `FindContact` and `ResolveName`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCursor {
    /// Offer to add more attendees once the list is resolved
    #[serde(default)]
    pub prompt_more: bool,
    /// How many times the user chose to add more
    #[serde(default)]
    pub round: u32,
    /// Not-found prompts sent for the current name
    #[serde(default)]
    pub retries: u32,
    /// Replacement text for the current name after a not-found prompt
    #[serde(default)]
    pub retry_name: Option<String>,
}

/// Candidates on offer and the page being shown
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCursor {
    /// Candidates, in display order
    pub candidates: Vec<CandidateIdentity>,
    /// Zero-based page
    #[serde(default)]
    pub page_index: usize,
}

fn resolver_options(contacts: Option<ContactCursor>, selection: Option<SelectionCursor>) -> FlowOptions {
    FlowOptions {
        contacts,
        selection,
        ..FlowOptions::sub_flow()
    }
}

fn attendee_of(candidate: &CandidateIdentity) -> Result<Attendee, DialogError> {
    let address = candidate
        .addresses
        .first()
        .ok_or_else(|| DialogError::missing("candidate address"))?;
    Ok(Attendee::new(candidate.display_name.clone(), address.clone()))
}

// ============================================================================
// FindContact
// ============================================================================

/// Collect attendee names and resolve each of them
#[derive(Debug, Default)]
pub struct FindContact;

#[async_trait]
impl Flow for FindContact {
    fn id(&self) -> FlowId {
        FlowId::FindContact
    }

    fn step_count(&self) -> usize {
        4
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.contacts.reset_names();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let cursor = options.contacts.get_or_insert_with(ContactCursor::default);
        match index {
            0 => {
                if !ctx.state.contacts.name_list.is_empty() {
                    return Ok(StepOutcome::Next(StepResult::Empty));
                }
                let template = if cursor.round == 0 {
                    Template::NoAttendees
                } else {
                    Template::AddMoreAttendees
                };
                Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                    template,
                ))))
            }
            1 => {
                if let StepResult::Text(answer) = input {
                    if is_skip(&answer) {
                        ctx.state.contacts.add_name("myself");
                    } else {
                        for name in split_names(&answer) {
                            ctx.state.contacts.add_name(&name);
                        }
                    }
                }
                let names = &ctx.state.contacts.name_list;
                if names.is_empty() {
                    return Err(DialogError::Validation("no attendee names given".into()));
                }
                if names.len() > 1 {
                    let listed = names.join(", ");
                    ctx.send(OutgoingMessage::new(Template::BeforeSendingMessage).with("names", listed));
                }
                ctx.state.contacts.current_index = 0;
                Ok(StepOutcome::Begin {
                    flow: FlowId::ResolveName,
                    options: resolver_options(None, None),
                })
            }
            2 => {
                ctx.state.contacts.reset_names();
                if input == StepResult::Cancelled {
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                if cursor.prompt_more && ctx.state.contacts.confirmed.len() < ctx.config.max_contacts {
                    return Ok(StepOutcome::Prompt(PromptSpec::confirm(OutgoingMessage::new(
                        Template::AddMoreUserPrompt,
                    ))));
                }
                Ok(StepOutcome::End(StepResult::Empty))
            }
            3 => match input {
                StepResult::Confirmed(true) => {
                    let next = ContactCursor {
                        prompt_more: cursor.prompt_more,
                        round: cursor.round + 1,
                        ..ContactCursor::default()
                    };
                    Ok(StepOutcome::Replace {
                        flow: FlowId::FindContact,
                        options: FlowOptions {
                            sub_flow_mode: options.sub_flow_mode,
                            contacts: Some(next),
                            ..FlowOptions::default()
                        },
                    })
                }
                _ => Ok(StepOutcome::End(StepResult::Empty)),
            },
            _ => Err(DialogError::Fatal(format!("FindContact has no step {index}"))),
        }
    }
}

// ============================================================================
// ResolveName
// ============================================================================

/// Resolve the name at the contact cursor
#[derive(Debug, Default)]
pub struct ResolveName;

enum Lookup {
    Confirmed(Attendee),
    Candidates(Vec<CandidateIdentity>),
}

impl ResolveName {
    async fn lookup(ctx: &mut TurnContext<'_>, name: &str) -> Result<Lookup, DialogError> {
        if is_email(name) {
            let address = name.trim().to_string();
            return Ok(Lookup::Confirmed(Attendee::new(address.clone(), address)));
        }

        let lowered = name.trim().to_lowercase();
        if matches!(lowered.as_str(), "myself" | "me" | "i") {
            let me = ctx.services.directory.me().await?;
            return Ok(Lookup::Candidates(merge_candidates(vec![], vec![me], vec![])));
        }

        let related = ctx
            .state
            .contacts
            .relationships
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
            .map(|(_, entity)| entity.clone());
        if let Some(related) = related {
            let relationship = related.relationship.to_lowercase();
            if !MANAGER_WORDS.contains(&relationship.as_str()) {
                tracing::debug!(relationship = %relationship, "Unsupported relationship");
                return Ok(Lookup::Candidates(Vec::new()));
            }
            let manager = match related.pronoun {
                PronounKind::FirstPerson => ctx.services.directory.manager_of(None).await?,
                PronounKind::ThirdPerson => match ctx.state.contacts.confirmed.last() {
                    Some(last) => {
                        let address = last.address.clone();
                        ctx.services.directory.manager_of(Some(&address)).await?
                    }
                    None => None,
                },
            };
            let found = manager.into_iter().collect();
            return Ok(Lookup::Candidates(merge_candidates(vec![], found, vec![])));
        }

        let directory = &ctx.services.directory;
        let (work_with, contacts, users) = futures::try_join!(
            directory.people_work_with(name),
            directory.contacts(name),
            directory.users(name),
        )?;
        Ok(Lookup::Candidates(merge_candidates(work_with, contacts, users)))
    }

    fn advance(ctx: &mut TurnContext<'_>, attendee: Attendee) -> StepOutcome {
        tracing::debug!(address = %attendee.address, "Confirmed attendee");
        ctx.state.contacts.confirm(attendee);
        let contacts = &mut ctx.state.contacts;
        contacts.current_name = None;
        if contacts.current_index + 1 < contacts.name_list.len() {
            contacts.current_index += 1;
            StepOutcome::Replace {
                flow: FlowId::ResolveName,
                options: resolver_options(None, None),
            }
        } else {
            StepOutcome::End(StepResult::Empty)
        }
    }

    fn not_found(ctx: &mut TurnContext<'_>, cursor: &mut ContactCursor, name: &str) -> StepOutcome {
        if cursor.retries >= ctx.config.contact_retry_limit {
            tracing::info!(name = %name, "Giving up on attendee name");
            ctx.send(OutgoingMessage::new(Template::UserNotFoundAgain).with("name", name));
            return StepOutcome::End(StepResult::Cancelled);
        }
        cursor.retries += 1;
        let template = if cursor.retries == 1 {
            Template::UserNotFound
        } else {
            Template::UserNotFoundAgain
        };
        StepOutcome::Prompt(PromptSpec::text(
            OutgoingMessage::new(template).with("name", name),
        ))
    }
}

#[async_trait]
impl Flow for ResolveName {
    fn id(&self) -> FlowId {
        FlowId::ResolveName
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.contacts.reset_names();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let mut cursor = options.contacts.clone().unwrap_or_default();
        let outcome = match index {
            0 => {
                let idx = ctx.state.contacts.current_index;
                let name = cursor
                    .retry_name
                    .clone()
                    .or_else(|| ctx.state.contacts.name_list.get(idx).cloned())
                    .ok_or_else(|| DialogError::missing("attendee name"))?;
                ctx.state.contacts.current_name = Some(name.clone());

                match Self::lookup(ctx, &name).await? {
                    Lookup::Confirmed(attendee) => Self::advance(ctx, attendee),
                    Lookup::Candidates(candidates) => match candidates.as_slice() {
                        [] => Self::not_found(ctx, &mut cursor, &name),
                        [only] if only.addresses.len() == 1 => {
                            let attendee = attendee_of(only)?;
                            ctx.send(
                                OutgoingMessage::new(Template::PromptOneNameOneAddress)
                                    .with("name", attendee.display_name.clone())
                                    .with("email", attendee.address.clone()),
                            );
                            Self::advance(ctx, attendee)
                        }
                        [_] => StepOutcome::Begin {
                            flow: FlowId::SelectEmail,
                            options: resolver_options(
                                None,
                                Some(SelectionCursor {
                                    candidates,
                                    page_index: 0,
                                }),
                            ),
                        },
                        _ => StepOutcome::Begin {
                            flow: FlowId::SelectPerson,
                            options: resolver_options(
                                None,
                                Some(SelectionCursor {
                                    candidates,
                                    page_index: 0,
                                }),
                            ),
                        },
                    },
                }
            }
            1 => match input {
                StepResult::Text(answer) if answer.trim().is_empty() => {
                    let name = ctx.state.contacts.current_name.clone().unwrap_or_default();
                    ctx.send(OutgoingMessage::new(Template::UserNotFoundAgain).with("name", name));
                    StepOutcome::End(StepResult::Cancelled)
                }
                StepResult::Text(answer) => {
                    let next = ContactCursor {
                        retry_name: Some(answer.trim().to_string()),
                        ..cursor.clone()
                    };
                    StepOutcome::Replace {
                        flow: FlowId::ResolveName,
                        options: resolver_options(Some(next), None),
                    }
                }
                StepResult::Identity(candidate) => Self::advance(ctx, attendee_of(&candidate)?),
                StepResult::Cancelled => StepOutcome::End(StepResult::Cancelled),
                _ => {
                    let contacts = &mut ctx.state.contacts;
                    if contacts.current_index + 1 < contacts.name_list.len() {
                        contacts.current_index += 1;
                        StepOutcome::Replace {
                            flow: FlowId::ResolveName,
                            options: resolver_options(None, None),
                        }
                    } else {
                        StepOutcome::End(StepResult::Empty)
                    }
                }
            },
            _ => return Err(DialogError::Fatal(format!("ResolveName has no step {index}"))),
        };
        options.contacts = Some(cursor);
        Ok(outcome)
    }
}

// ============================================================================
// SelectPerson / SelectEmail
// ============================================================================

/// Choose one person from several candidates
#[derive(Debug, Default)]
pub struct SelectPerson;

#[async_trait]
impl Flow for SelectPerson {
    fn id(&self) -> FlowId {
        FlowId::SelectPerson
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.contacts.current_name = None;
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let page_size = ctx.config.page_size;
        let selection = options
            .selection
            .as_mut()
            .ok_or_else(|| DialogError::missing("person candidates"))?;
        let (start, end) = page_bounds(selection.candidates.len(), selection.page_index, page_size);

        match (index, input) {
            (0, _) => {
                let choices = selection.candidates[start..end]
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        let address = c.addresses.first().map(String::as_str);
                        let label = match (c.addresses.len(), address) {
                            (1, Some(a)) => format!("{}: {a}", c.display_name),
                            _ => c.display_name.clone(),
                        };
                        identity_choice(i, &label, &c.display_name, address)
                    })
                    .collect();
                let name = ctx.state.contacts.current_name.clone().unwrap_or_default();
                Ok(StepOutcome::Prompt(PromptSpec::choice(
                    OutgoingMessage::new(Template::ConfirmMultipleContactName).with("name", name),
                    choices,
                    true,
                )))
            }
            (1, StepResult::Page(mv)) => {
                let len = selection.candidates.len();
                if let Some(message) = move_page(len, &mut selection.page_index, page_size, mv) {
                    ctx.send(message);
                }
                Ok(StepOutcome::Replace {
                    flow: FlowId::SelectPerson,
                    options: options.clone(),
                })
            }
            (1, StepResult::Choice(found)) => {
                let person = selection
                    .candidates
                    .get(start + found.index)
                    .cloned()
                    .ok_or_else(|| DialogError::Validation(format!("no candidate {}", found.value)))?;
                if person.addresses.len() > 1 {
                    Ok(StepOutcome::Replace {
                        flow: FlowId::SelectEmail,
                        options: resolver_options(
                            None,
                            Some(SelectionCursor {
                                candidates: vec![person],
                                page_index: 0,
                            }),
                        ),
                    })
                } else {
                    Ok(StepOutcome::End(StepResult::Identity(person)))
                }
            }
            (step, other) => Err(DialogError::Fatal(format!(
                "SelectPerson step {step} got {other:?}"
            ))),
        }
    }
}

/// Choose one address of a person
#[derive(Debug, Default)]
pub struct SelectEmail;

#[async_trait]
impl Flow for SelectEmail {
    fn id(&self) -> FlowId {
        FlowId::SelectEmail
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.contacts.current_name = None;
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let page_size = ctx.config.page_size;
        let selection = options
            .selection
            .as_mut()
            .ok_or_else(|| DialogError::missing("address candidates"))?;
        let person = selection
            .candidates
            .first()
            .cloned()
            .ok_or_else(|| DialogError::missing("person"))?;
        let (start, end) = page_bounds(person.addresses.len(), selection.page_index, page_size);

        match (index, input) {
            (0, _) => {
                let choices = person.addresses[start..end]
                    .iter()
                    .enumerate()
                    .map(|(i, a)| identity_choice(i, a, a, Some(a)))
                    .collect();
                Ok(StepOutcome::Prompt(PromptSpec::choice(
                    OutgoingMessage::new(Template::ConfirmMultipleContactEmail)
                        .with("name", person.display_name.clone()),
                    choices,
                    true,
                )))
            }
            (1, StepResult::Page(mv)) => {
                let len = person.addresses.len();
                if let Some(message) = move_page(len, &mut selection.page_index, page_size, mv) {
                    ctx.send(message);
                }
                Ok(StepOutcome::Replace {
                    flow: FlowId::SelectEmail,
                    options: options.clone(),
                })
            }
            (1, StepResult::Choice(found)) => {
                let address = person
                    .addresses
                    .get(start + found.index)
                    .cloned()
                    .ok_or_else(|| DialogError::Validation(format!("no address {}", found.value)))?;
                Ok(StepOutcome::End(StepResult::Identity(CandidateIdentity {
                    addresses: vec![address],
                    ..person
                })))
            }
            (step, other) => Err(DialogError::Fatal(format!(
                "SelectEmail step {step} got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::PersonFixture;
    use crate::services::Fixtures;
    use crate::testing::Harness;
    use pretty_assertions::assert_eq;

    fn person(name: &str, addresses: &[&str]) -> PersonFixture {
        PersonFixture {
            name: name.to_string(),
            addresses: addresses.iter().map(ToString::to_string).collect(),
        }
    }

    fn fixtures() -> Fixtures {
        Fixtures {
            me: Some(person("Pat Doe", &["pat@contoso.com"])),
            users: vec![
                person("Alex Wilber", &["alexw@contoso.com"]),
                person("Alex Johnson", &["alexj@contoso.com"]),
                person("Alex Darrow", &["alexd@contoso.com"]),
                person("Alex Kim", &["alexk@contoso.com"]),
                person("Megan Bowen", &["meganb@contoso.com", "megan@fabrikam.com"]),
            ],
            managers: [("pat@contoso.com".to_string(), "meganb@contoso.com".to_string())]
                .into_iter()
                .collect(),
            ..Fixtures::default()
        }
    }

    fn confirmed(h: &Harness) -> Vec<String> {
        h.state
            .contacts
            .confirmed
            .iter()
            .map(|a| a.address.clone())
            .collect()
    }

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_names("Alex, Megan and Lee; Kim & Pat"),
            vec!["Alex", "Megan", "Lee", "Kim", "Pat"]
        );
        assert_eq!(split_names("Alexander"), vec!["Alexander"]);
    }

    #[tokio::test]
    async fn test_address_confirmed_without_prompt() {
        let mut h = Harness::new(fixtures());
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoAttendees]);

        let sent = h.reply_text("a@b.com").await;
        assert!(sent.is_empty());
        assert!(h.stack.is_empty());
        assert_eq!(confirmed(&h), vec!["a@b.com"]);
    }

    #[tokio::test]
    async fn test_pages_through_candidates() {
        let mut h = Harness::new(fixtures());
        h.state.contacts.add_name("Alex");
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmMultipleContactName]);
        assert_eq!(sent[0].choices.len(), 3);

        let sent = h.reply_text("previous").await;
        assert_eq!(
            Harness::templates(&sent),
            vec![Template::AlreadyFirstPage, Template::ConfirmMultipleContactName]
        );

        let sent = h.reply_text("next").await;
        assert_eq!(sent.last().map(|m| m.choices.len()), Some(1));

        let sent = h.reply_text("next").await;
        assert_eq!(
            Harness::templates(&sent),
            vec![Template::AlreadyLastPage, Template::ConfirmMultipleContactName]
        );
        assert_eq!(sent[1].choices, vec!["Alex Kim: alexk@contoso.com".to_string()]);

        h.reply_text("1").await;
        assert_eq!(confirmed(&h), vec!["alexk@contoso.com"]);
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_addresses_ask_for_email() {
        let mut h = Harness::new(fixtures());
        h.state.contacts.add_name("Megan");
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmMultipleContactEmail]);

        h.reply_text("megan").await;
        assert_eq!(confirmed(&h), vec!["megan@fabrikam.com"]);
    }

    #[tokio::test]
    async fn test_not_found_retries_then_aborts() {
        let mut h = Harness::new(fixtures());
        h.state.contacts.add_name("Zed");
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::UserNotFound]);

        let sent = h.reply_text("Zedd").await;
        assert_eq!(Harness::templates(&sent), vec![Template::UserNotFoundAgain]);
        let sent = h.reply_text("Zeddy").await;
        assert_eq!(Harness::templates(&sent), vec![Template::UserNotFoundAgain]);

        let sent = h.reply_text("Zz").await;
        assert_eq!(Harness::templates(&sent), vec![Template::UserNotFoundAgain]);
        assert!(h.stack.is_empty());
        assert!(h.state.contacts.confirmed.is_empty());
        assert!(h.state.contacts.name_list.is_empty());
    }

    #[tokio::test]
    async fn test_retry_with_better_name_resolves() {
        let mut h = Harness::new(fixtures());
        h.state.contacts.add_name("Zed");
        h.begin(FlowId::FindContact, FlowOptions::default()).await;

        let sent = h.reply_text("Alex Darrow").await;
        assert_eq!(Harness::templates(&sent), vec![Template::PromptOneNameOneAddress]);
        assert_eq!(confirmed(&h), vec!["alexd@contoso.com"]);
    }

    #[tokio::test]
    async fn test_myself_and_manager() {
        let mut h = Harness::new(fixtures());
        h.state.contacts.relationships.insert(
            "my manager".into(),
            crate::state::RelatedEntity {
                pronoun: PronounKind::FirstPerson,
                relationship: "manager".into(),
            },
        );
        h.state.contacts.add_name("myself");
        h.state.contacts.add_name("my manager");
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;

        assert_eq!(Harness::templates(&sent)[0], Template::BeforeSendingMessage);
        assert_eq!(Harness::templates(&sent).last(), Some(&Template::ConfirmMultipleContactEmail));
        h.reply_text("1").await;
        assert_eq!(confirmed(&h), vec!["pat@contoso.com", "meganb@contoso.com"]);
    }

    #[tokio::test]
    async fn test_add_more_round() {
        let mut h = Harness::new(fixtures());
        let options = FlowOptions {
            contacts: Some(ContactCursor {
                prompt_more: true,
                ..ContactCursor::default()
            }),
            ..FlowOptions::default()
        };
        h.begin(FlowId::FindContact, options).await;

        let sent = h.reply_text("alexw@contoso.com").await;
        assert_eq!(Harness::templates(&sent), vec![Template::AddMoreUserPrompt]);

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::AddMoreAttendees]);

        h.reply_text("Alex Johnson").await;
        let sent = h.reply_text("no").await;
        assert!(sent.is_empty());
        assert_eq!(confirmed(&h), vec!["alexw@contoso.com", "alexj@contoso.com"]);
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_directory_failure_is_reported() {
        let mut h = Harness::new(fixtures());
        h.directory.set_failure(Some(crate::error::ServiceError::Rejected {
            service: "directory",
            kind: crate::error::SkillErrorKind::Forbidden,
            message: "denied".into(),
        }));
        h.state.contacts.add_name("Alex");
        let sent = h.begin(FlowId::FindContact, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::AccountProblem]);
        assert!(h.stack.is_empty());
    }
}
