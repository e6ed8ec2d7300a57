//! Inquiries from prospective buyers and renters to listing owners. A
//! `site_visit` inquiry doubles as a viewing request.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use crate::{
    database::{Database, Inquiry, InquiryResponse, InquiryStatus, InquiryType},
    error::{AppError, AppResult},
    identity::Identity,
    pagination::{Page, PageRequest, INBOX_PAGE_SIZE, MAX_PAGE_SIZE},
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct InquiryInput {
    pub(crate) property_id: Option<u64>,
    pub(crate) message: Option<String>,
    pub(crate) inquiry_type: InquiryType,
    pub(crate) preferred_visit_date: Option<NaiveDate>,
    pub(crate) preferred_visit_time: Option<String>,
}

/// Which side of the conversation an inbox shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mailbox {
    Sent,
    Received,
}

fn required_message(message: Option<&str>) -> AppResult<String> {
    match message.map(str::trim) {
        Some(message) if !message.is_empty() => Ok(message.to_string()),
        _ => Err(AppError::validation("message is required")),
    }
}

/// Sends an inquiry to the listing owner. `today` bounds the earliest
/// acceptable visit date.
pub(crate) fn create(
    db: &Database,
    identity: &Identity,
    input: InquiryInput,
    today: NaiveDate,
) -> AppResult<Inquiry> {
    let property_id = input
        .property_id
        .ok_or_else(|| AppError::validation("propertyId is required"))?;
    let property = db
        .property(property_id)?
        .ok_or(AppError::NotFound("property"))?;
    if property.owner_id == identity.user_id {
        return Err(AppError::validation(
            "you cannot send an inquiry about your own property",
        ));
    }
    let message = required_message(input.message.as_deref())?;
    if input.inquiry_type == InquiryType::SiteVisit {
        match input.preferred_visit_date {
            None => {
                return Err(AppError::validation(
                    "preferredVisitDate is required for a site visit",
                ))
            }
            Some(date) if date < today => {
                return Err(AppError::validation(
                    "preferredVisitDate cannot be in the past",
                ))
            }
            Some(_) => {}
        }
    }

    let now = Utc::now();
    let inquiry = db.insert_inquiry(Inquiry {
        id: 0,
        property_id,
        sender_id: identity.user_id,
        receiver_id: property.owner_id,
        message,
        inquiry_type: input.inquiry_type,
        preferred_visit_date: input.preferred_visit_date,
        preferred_visit_time: input
            .preferred_visit_time
            .map(|time| time.trim().to_string())
            .filter(|time| !time.is_empty()),
        status: InquiryStatus::Pending,
        responses: Vec::new(),
        is_read: false,
        read_at: None,
        created_at: now,
        updated_at: now,
    })?;
    db.record_inquiry(property_id)?;
    info!(
        id = inquiry.id,
        property_id,
        kind = ?inquiry.inquiry_type,
        "inquiry sent"
    );
    Ok(inquiry)
}

/// The caller's sent or received inquiries, newest first. An unknown
/// `status` filter is ignored.
pub(crate) fn mailbox(
    db: &Database,
    identity: &Identity,
    mailbox: Mailbox,
    status: Option<&str>,
    page: Option<&str>,
    limit: Option<&str>,
) -> AppResult<Page<Inquiry>> {
    let status: Option<InquiryStatus> = status.and_then(|raw| raw.parse().ok());
    let mut inquiries = Vec::new();
    for inquiry in db.inquiries().rev() {
        let inquiry = inquiry?;
        let party = match mailbox {
            Mailbox::Sent => inquiry.sender_id,
            Mailbox::Received => inquiry.receiver_id,
        };
        if party == identity.user_id && status.map_or(true, |status| inquiry.status == status) {
            inquiries.push(inquiry);
        }
    }
    let request = PageRequest::parse(page, limit, INBOX_PAGE_SIZE, MAX_PAGE_SIZE);
    Ok(Page::slice(inquiries, request))
}

fn require_party(inquiry: &Inquiry, identity: &Identity) -> AppResult<()> {
    if identity.user_id == inquiry.sender_id
        || identity.user_id == inquiry.receiver_id
        || identity.is_admin()
    {
        Ok(())
    } else {
        Err(AppError::forbidden("not authorized to view this inquiry"))
    }
}

/// Opens an inquiry. The first time the receiver opens it, it is marked
/// read.
pub(crate) fn open(db: &Database, identity: &Identity, id: u64) -> AppResult<Inquiry> {
    let inquiry = db.inquiry(id)?.ok_or(AppError::NotFound("inquiry"))?;
    require_party(&inquiry, identity)?;
    if inquiry.receiver_id != identity.user_id || inquiry.is_read {
        return Ok(inquiry);
    }
    let now = Utc::now();
    db.modify_inquiry(id, |inquiry: &mut Inquiry| -> AppResult<()> {
        if !inquiry.is_read {
            inquiry.is_read = true;
            inquiry.read_at = Some(now);
        }
        Ok(())
    })?
    .ok_or(AppError::NotFound("inquiry"))
}

/// Appends a reply. A receiver's reply to a pending inquiry marks it
/// responded.
pub(crate) fn reply(
    db: &Database,
    identity: &Identity,
    id: u64,
    message: Option<&str>,
) -> AppResult<Inquiry> {
    let message = required_message(message)?;
    let now = Utc::now();
    db.modify_inquiry(id, |inquiry: &mut Inquiry| -> AppResult<()> {
        let from_receiver = identity.user_id == inquiry.receiver_id;
        if !from_receiver && identity.user_id != inquiry.sender_id {
            return Err(AppError::forbidden("not authorized to reply to this inquiry"));
        }
        if inquiry.status.is_final() {
            return Err(AppError::validation("this inquiry is closed"));
        }
        inquiry.responses.push(InquiryResponse {
            message: message.clone(),
            responder_id: identity.user_id,
            created_at: now,
        });
        if from_receiver && inquiry.status == InquiryStatus::Pending {
            inquiry.status = InquiryStatus::Responded;
        }
        inquiry.updated_at = now;
        Ok(())
    })?
    .ok_or(AppError::NotFound("inquiry"))
}

/// Moves an inquiry through its lifecycle. Senders may only cancel;
/// receivers and admins may make any allowed move.
pub(crate) fn change_status(
    db: &Database,
    identity: &Identity,
    id: u64,
    status: &str,
) -> AppResult<Inquiry> {
    let next: InquiryStatus = status.parse().map_err(AppError::Validation)?;
    db.modify_inquiry(id, |inquiry: &mut Inquiry| -> AppResult<()> {
        let is_receiver = identity.user_id == inquiry.receiver_id || identity.is_admin();
        if !is_receiver {
            if identity.user_id != inquiry.sender_id {
                return Err(AppError::forbidden("not authorized to update this inquiry"));
            }
            if next != InquiryStatus::Cancelled {
                return Err(AppError::forbidden("the sender can only cancel an inquiry"));
            }
        }
        if !inquiry.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "cannot change status from {:?} to {next:?}",
                inquiry.status
            )));
        }
        inquiry.status = next;
        inquiry.updated_at = Utc::now();
        Ok(())
    })?
    .ok_or(AppError::NotFound("inquiry"))
}

pub(crate) fn delete(db: &Database, identity: &Identity, id: u64) -> AppResult<()> {
    let inquiry = db.inquiry(id)?.ok_or(AppError::NotFound("inquiry"))?;
    identity.require_owner_or_admin(inquiry.sender_id, "inquiry")?;
    db.remove_inquiry(id)?;
    Ok(())
}
