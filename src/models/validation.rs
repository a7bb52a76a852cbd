use crate::{
    error::DispatchError,
    models::notification::{NotificationIntent, NotificationType},
};

pub const MAX_BULK_SIZE: usize = 100;

pub fn validate_intent(intent: &NotificationIntent) -> Result<(), DispatchError> {
    if intent.to.is_empty() {
        return Err(DispatchError::Validation("Recipient is required".to_string()));
    }

    if intent.message.is_empty() {
        return Err(DispatchError::Validation("Message is required".to_string()));
    }

    let template_required = intent.notification_type == NotificationType::Whatsapp
        && intent.provider.is_some_and(|p| p.is_template_based());

    if template_required {
        if intent.content_sid.as_deref().is_none_or(str::is_empty) {
            return Err(DispatchError::Validation(
                "contentSid is required for WhatsApp via Twilio".to_string(),
            ));
        }

        if intent.content_variables.is_none() {
            return Err(DispatchError::Validation(
                "contentVariables is required for WhatsApp via Twilio".to_string(),
            ));
        }
    }

    Ok(())
}

pub fn validate_bulk(intents: &[NotificationIntent]) -> Result<(), DispatchError> {
    if intents.is_empty() {
        return Err(DispatchError::Validation(
            "At least one notification is required".to_string(),
        ));
    }

    if intents.len() > MAX_BULK_SIZE {
        return Err(DispatchError::Validation(format!(
            "At most {} notifications are allowed per request",
            MAX_BULK_SIZE
        )));
    }

    for (index, intent) in intents.iter().enumerate() {
        validate_intent(intent).map_err(|e| match e {
            DispatchError::Validation(reason) => {
                DispatchError::Validation(format!("notifications[{}]: {}", index, reason))
            }
            other => other,
        })?;
    }

    Ok(())
}
