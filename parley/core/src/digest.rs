//! Entity Digester
//!
//! Merges one turn's recognized entities into [`ConversationState`]. Values
//! are always sliced out of the raw utterance by their character spans.
//!
//! Digestion only adds: it appends candidates, fills unset fields and
//! records relationship placeholders. It never clears or overwrites a slot,
//! so digesting the same turn twice leaves the state as digesting it once.

use regex::Regex;

use crate::dialog::prompt::{bounded_duration, parse_duration, parse_number};
use crate::recognizer::{CalendarIntent, Entity, EntityKind, RawSpan, Resolution};
use crate::state::{ConversationState, MeetingSlots, PronounKind, RelatedEntity};

/// Which slots an intent is allowed to fill
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotScope {
    /// Everything a new meeting needs
    Create,
    /// What narrows an event search
    Search,
    /// An event search plus the change to make to it
    Update,
    /// Nothing but relationships
    None,
}

fn scope_of(intent: CalendarIntent) -> SlotScope {
    use CalendarIntent as I;
    match intent {
        I::CreateCalendarEntry | I::FindMeetingRoom => SlotScope::Create,
        I::ChangeCalendarEntry | I::AddMeetingRoom | I::ChangeMeetingRoom | I::CancelMeetingRoom => {
            SlotScope::Update
        }
        I::AcceptEventEntry
        | I::DeleteCalendarEntry
        | I::ConnectToMeeting
        | I::FindCalendarEntry
        | I::FindCalendarDetail
        | I::FindCalendarWhen
        | I::FindCalendarWhere
        | I::FindCalendarWho
        | I::FindDuration
        | I::TimeRemaining
        | I::CheckAvailability
        | I::ShowNextCalendar
        | I::ShowPreviousCalendar => SlotScope::Search,
        I::RejectCalendar | I::None => SlotScope::None,
    }
}

/// Digest a turn that starts a task
///
/// Returns whether any slot changed.
pub fn digest_on_entry(
    state: &mut ConversationState,
    intent: CalendarIntent,
    entities: &[Entity],
    text: &str,
) -> bool {
    if state.initial_intent.is_none() && intent != CalendarIntent::None {
        state.initial_intent = Some(intent);
    }

    let placeholders = record_relationships(state, entities, text);
    let scope = scope_of(intent);
    let mut names: Vec<(usize, String)> = placeholders
        .iter()
        .map(|(span, key)| (span.start, key.clone()))
        .collect();
    if scope != SlotScope::None {
        names.extend(
            entities
                .iter()
                .filter(|e| matches!(e.kind, EntityKind::ContactName | EntityKind::Email))
                .filter(|e| !placeholders.iter().any(|(span, _)| within(e.span, *span)))
                .filter_map(|e| e.text(text).map(|t| (e.span.start, t.to_string()))),
        );
    }
    names.sort_by_key(|(start, _)| *start);
    let mut changed = false;
    for (_, name) in &names {
        changed |= state.contacts.add_name(name);
    }
    if scope == SlotScope::None {
        return changed;
    }

    for entity in entities {
        let Some(value) = entity.text(text) else {
            continue;
        };
        if scope == SlotScope::Update {
            changed |= digest_update(state, entity, value);
            continue;
        }
        let meeting = &mut state.meeting;
        changed |= match entity.kind {
            EntityKind::Subject => set_if_unset(&mut meeting.title, value),
            EntityKind::Location => set_if_unset(&mut meeting.location, value),
            EntityKind::OrderReference => set_if_unset(&mut meeting.order_reference, value),
            EntityKind::DateTime
            | EntityKind::FromDate
            | EntityKind::FromTime
            | EntityKind::ToDate
            | EntityKind::ToTime => digest_date_time(meeting, entity),
            kind if scope == SlotScope::Create => digest_create_only(meeting, kind, entity, value),
            _ => false,
        };
    }

    if scope == SlotScope::Create && changed {
        state.meeting.create_has_detail = true;
    }
    if changed {
        tracing::debug!(?intent, entities = entities.len(), "Digested turn entities");
    }
    changed
}

/// Slots only a new meeting cares about
fn digest_create_only(meeting: &mut MeetingSlots, kind: EntityKind, entity: &Entity, value: &str) -> bool {
    match kind {
        EntityKind::Content => set_if_unset(&mut meeting.content, value),
        EntityKind::Duration if meeting.duration_secs.is_none() => {
            meeting.duration_secs = duration_of(entity, value);
            meeting.duration_secs.is_some()
        }
        kind => digest_room(meeting, kind, entity, value),
    }
}

/// Room name, building and floor
fn digest_room(meeting: &mut MeetingSlots, kind: EntityKind, entity: &Entity, value: &str) -> bool {
    match kind {
        EntityKind::MeetingRoom => set_if_unset(&mut meeting.meeting_room_name, value),
        EntityKind::Building => set_if_unset(&mut meeting.building, value),
        EntityKind::FloorNumber if meeting.floor_number.is_none() => {
            let floor = entity
                .values
                .iter()
                .find_map(|r| match r {
                    Resolution::Number { value } => Some(*value),
                    _ => None,
                })
                .or_else(|| parse_number(value))
                .and_then(|n| i32::try_from(n).ok());
            meeting.floor_number = floor;
            floor.is_some()
        }
        _ => false,
    }
}

fn duration_of(entity: &Entity, value: &str) -> Option<i64> {
    entity
        .values
        .iter()
        .find_map(|r| match r {
            Resolution::Duration { seconds } => Some(*seconds),
            _ => None,
        })
        .or_else(|| parse_duration(value))
        .and_then(bounded_duration)
}

/// "Move my 2pm to 4pm": from-parts find the event, to-parts are the new start
fn digest_update(state: &mut ConversationState, entity: &Entity, value: &str) -> bool {
    let meeting = &mut state.meeting;
    match entity.kind {
        EntityKind::Subject => set_if_unset(&mut meeting.title, value),
        EntityKind::Location => set_if_unset(&mut meeting.location, value),
        EntityKind::OrderReference => set_if_unset(&mut meeting.order_reference, value),
        EntityKind::DateTime | EntityKind::FromDate | EntityKind::FromTime => {
            let mut changed = false;
            for resolution in &entity.values {
                match resolution {
                    Resolution::Point { value } => changed |= meeting.push_start(*value),
                    Resolution::Range { start, .. } => changed |= meeting.push_start(*start),
                    Resolution::Duration { .. } | Resolution::Number { .. } => {}
                }
            }
            changed
        }
        EntityKind::ToDate | EntityKind::ToTime => {
            let mut changed = false;
            for resolution in &entity.values {
                match resolution {
                    Resolution::Point { value } | Resolution::Range { start: value, .. } => {
                        changed |= state.update.push_new_start(*value);
                    }
                    Resolution::Duration { .. } | Resolution::Number { .. } => {}
                }
            }
            changed
        }
        EntityKind::Duration if state.update.duration_secs.is_none() => {
            state.update.duration_secs = duration_of(entity, value);
            state.update.duration_secs.is_some()
        }
        kind => digest_room(meeting, kind, entity, value),
    }
}

/// Route each resolution of a date/time entity to the start or end lists
fn digest_date_time(meeting: &mut MeetingSlots, entity: &Entity) -> bool {
    let is_end = matches!(entity.kind, EntityKind::ToDate | EntityKind::ToTime);
    let mut changed = false;
    for resolution in &entity.values {
        match resolution {
            Resolution::Point { value } => {
                changed |= if is_end {
                    meeting.push_end(*value)
                } else {
                    meeting.push_start(*value)
                };
            }
            Resolution::Range { start, end } => {
                if !is_end {
                    changed |= meeting.push_start(*start);
                }
                changed |= meeting.push_end(*end);
            }
            Resolution::Duration { .. } | Resolution::Number { .. } => {}
        }
    }
    changed
}

/// Record "his manager" style placeholders and queue them as names
///
/// Runs on every turn, including answers to a pending prompt. Returns
/// whether a new name was queued.
pub fn digest_relationships(state: &mut ConversationState, entities: &[Entity], text: &str) -> bool {
    let mut changed = false;
    for (_, key) in record_relationships(state, entities, text) {
        changed |= state.contacts.add_name(&key);
    }
    changed
}

/// Placeholders named in the turn, with the span each one covers
fn record_relationships(
    state: &mut ConversationState,
    entities: &[Entity],
    text: &str,
) -> Vec<(RawSpan, String)> {
    let mut found = Vec::new();
    for relation in entities.iter().filter(|e| e.kind == EntityKind::RelationshipName) {
        let Some(pronoun) = entities
            .iter()
            .filter(|e| e.kind == EntityKind::PronounType && e.span.end <= relation.span.start)
            .max_by_key(|e| e.span.end)
        else {
            continue;
        };
        let (Some(pronoun_text), Some(relation_text)) = (pronoun.text(text), relation.text(text))
        else {
            continue;
        };
        let span = RawSpan::new(pronoun.span.start, relation.span.end);
        let Some(key) = span.slice(text) else {
            continue;
        };
        if !is_relationship_phrase(key, pronoun_text, relation_text) {
            tracing::debug!(phrase = %key, "Pronoun and relationship are not adjacent");
            continue;
        }
        let Some(kind) = PronounKind::classify(pronoun_text) else {
            continue;
        };
        state
            .contacts
            .relationships
            .entry(key.to_string())
            .or_insert_with(|| RelatedEntity {
                pronoun: kind,
                relationship: relation_text.trim().to_string(),
            });
        found.push((span, key.to_string()));
    }
    found
}

fn is_relationship_phrase(phrase: &str, pronoun: &str, relationship: &str) -> bool {
    let pattern = format!(
        "(?i)^{}( )?{}$",
        regex::escape(pronoun.trim()),
        regex::escape(relationship.trim())
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(phrase.trim()))
}

fn set_if_unset(slot: &mut Option<String>, value: &str) -> bool {
    let value = value.trim();
    if slot.is_some() || value.is_empty() {
        return false;
    }
    *slot = Some(value.to_string());
    true
}

fn within(inner: RawSpan, outer: RawSpan) -> bool {
    inner.start >= outer.start && inner.end <= outer.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{DateTimeValue, RecognizedSignals};
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        s.parse().unwrap()
    }

    fn create_turn() -> (&'static str, RecognizedSignals) {
        let text = "book budget review with Alex and his manager tomorrow at 2pm for 30 minutes";
        let signals = RecognizedSignals::task(CalendarIntent::CreateCalendarEntry, 0.95)
            .with_entity(Entity::new(EntityKind::Subject, 5, 18))
            .with_entity(Entity::new(EntityKind::ContactName, 24, 28))
            .with_entity(Entity::new(EntityKind::PronounType, 33, 36))
            .with_entity(Entity::new(EntityKind::RelationshipName, 37, 44))
            .with_entity(Entity::new(EntityKind::ContactName, 37, 44))
            .with_entity(Entity::new(EntityKind::DateTime, 45, 60).resolved(Resolution::Point {
                value: DateTimeValue::at(date("2026-10-17"), time("14:00:00")),
            }))
            .with_entity(
                Entity::new(EntityKind::Duration, 65, 75).resolved(Resolution::Duration { seconds: 1800 }),
            );
        (text, signals)
    }

    #[test]
    fn test_create_turn_fills_slots() {
        let (text, signals) = create_turn();
        let mut state = ConversationState::default();
        assert!(digest_on_entry(&mut state, signals.task_intent(), signals.entities(), text));

        assert_eq!(state.initial_intent, Some(CalendarIntent::CreateCalendarEntry));
        assert_eq!(state.meeting.title.as_deref(), Some("budget review"));
        assert_eq!(state.contacts.name_list, vec!["Alex", "his manager"]);
        assert_eq!(
            state.contacts.relationships.get("his manager"),
            Some(&RelatedEntity {
                pronoun: PronounKind::ThirdPerson,
                relationship: "manager".into(),
            })
        );
        assert_eq!(state.meeting.start_date, vec![date("2026-10-17")]);
        assert_eq!(state.meeting.start_time, vec![time("14:00:00")]);
        assert_eq!(state.meeting.duration_secs, Some(1800));
        assert!(state.meeting.create_has_detail);
    }

    #[test]
    fn test_digest_is_idempotent() {
        let (text, signals) = create_turn();
        let mut once = ConversationState::default();
        digest_on_entry(&mut once, signals.task_intent(), signals.entities(), text);
        let mut twice = once.clone();
        assert!(!digest_on_entry(&mut twice, signals.task_intent(), signals.entities(), text));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_existing_slots_are_not_clobbered() {
        let mut state = ConversationState::default();
        state.meeting.title = Some("standup".into());
        state.meeting.location = Some("Room 12".into());
        let text = "lunch tomorrow";
        let entities = vec![Entity::new(EntityKind::Subject, 0, 5)];
        digest_on_entry(&mut state, CalendarIntent::CreateCalendarEntry, &entities, text);
        assert_eq!(state.meeting.title.as_deref(), Some("standup"));
        assert_eq!(state.meeting.location.as_deref(), Some("Room 12"));
    }

    #[test]
    fn test_unusable_duration_is_not_digested() {
        let text = "for 99999999999 hours";
        let entities = vec![Entity::new(EntityKind::Duration, 4, 21)];
        let mut state = ConversationState::default();
        digest_on_entry(&mut state, CalendarIntent::CreateCalendarEntry, &entities, text);
        assert_eq!(state.meeting.duration_secs, None);

        let resolved = vec![Entity::new(EntityKind::Duration, 4, 21)
            .resolved(Resolution::Duration { seconds: -60 })];
        digest_on_entry(&mut state, CalendarIntent::CreateCalendarEntry, &resolved, text);
        assert_eq!(state.meeting.duration_secs, None);
    }

    #[test]
    fn test_range_splits_into_start_and_end() {
        let text = "from 1pm to 3pm";
        let range = Entity::new(EntityKind::DateTime, 0, 15).resolved(Resolution::Range {
            start: DateTimeValue::time(time("13:00:00")),
            end: DateTimeValue::time(time("15:00:00")),
        });
        let until = Entity::new(EntityKind::ToTime, 12, 15).resolved(Resolution::Range {
            start: DateTimeValue::time(time("14:00:00")),
            end: DateTimeValue::time(time("16:00:00")),
        });
        let mut state = ConversationState::default();
        digest_on_entry(&mut state, CalendarIntent::FindCalendarEntry, &[range, until], text);
        assert_eq!(state.meeting.start_time, vec![time("13:00:00")]);
        assert_eq!(state.meeting.end_time, vec![time("15:00:00"), time("16:00:00")]);
    }

    #[test]
    fn test_search_scope_skips_create_slots() {
        let text = "show my meetings in building 5 for an hour";
        let entities = vec![
            Entity::new(EntityKind::Building, 20, 30),
            Entity::new(EntityKind::Duration, 35, 42),
        ];
        let mut state = ConversationState::default();
        assert!(!digest_on_entry(&mut state, CalendarIntent::FindCalendarEntry, &entities, text));
        assert_eq!(state.meeting.building, None);
        assert_eq!(state.meeting.duration_secs, None);
        assert!(!state.meeting.create_has_detail);
    }

    #[test]
    fn test_change_turn_splits_search_and_new_start() {
        let text = "move my 2pm budget sync to 4pm for 45 minutes";
        let entities = vec![
            Entity::new(EntityKind::FromTime, 8, 11).resolved(Resolution::Point {
                value: DateTimeValue::time(time("14:00:00")),
            }),
            Entity::new(EntityKind::Subject, 12, 23),
            Entity::new(EntityKind::ToTime, 27, 30).resolved(Resolution::Point {
                value: DateTimeValue::time(time("16:00:00")),
            }),
            Entity::new(EntityKind::Duration, 35, 45),
        ];
        let mut state = ConversationState::default();
        assert!(digest_on_entry(&mut state, CalendarIntent::ChangeCalendarEntry, &entities, text));
        assert_eq!(state.meeting.start_time, vec![time("14:00:00")]);
        assert_eq!(state.meeting.title.as_deref(), Some("budget sync"));
        assert_eq!(state.update.new_start_time, vec![time("16:00:00")]);
        assert_eq!(state.update.duration_secs, Some(2700));
        assert_eq!(state.meeting.duration_secs, None);
        assert!(state.meeting.end_time.is_empty());
    }

    #[test]
    fn test_room_change_turn_keeps_room_constraints() {
        let text = "add a room in building 5 on floor 2";
        let entities = vec![
            Entity::new(EntityKind::Building, 14, 24),
            Entity::new(EntityKind::FloorNumber, 34, 35),
        ];
        let mut state = ConversationState::default();
        digest_on_entry(&mut state, CalendarIntent::AddMeetingRoom, &entities, text);
        assert_eq!(state.meeting.building.as_deref(), Some("building 5"));
        assert_eq!(state.meeting.floor_number, Some(2));
        assert!(!state.meeting.create_has_detail);
    }

    #[test]
    fn test_initial_intent_is_kept() {
        let mut state = ConversationState::default();
        state.initial_intent = Some(CalendarIntent::FindMeetingRoom);
        digest_on_entry(&mut state, CalendarIntent::CreateCalendarEntry, &[], "");
        assert_eq!(state.initial_intent, Some(CalendarIntent::FindMeetingRoom));
    }

    #[test]
    fn test_relationship_needs_adjacent_pronoun() {
        let text = "my old manager";
        let entities = vec![
            Entity::new(EntityKind::PronounType, 0, 2),
            Entity::new(EntityKind::RelationshipName, 7, 14),
        ];
        let mut state = ConversationState::default();
        assert!(!digest_relationships(&mut state, &entities, text));
        assert!(state.contacts.name_list.is_empty());

        let text = "MY manager";
        let entities = vec![
            Entity::new(EntityKind::PronounType, 0, 2),
            Entity::new(EntityKind::RelationshipName, 3, 10),
        ];
        assert!(digest_relationships(&mut state, &entities, text));
        assert_eq!(
            state.contacts.relationships["MY manager"].pronoun,
            PronounKind::FirstPerson
        );
    }
}
