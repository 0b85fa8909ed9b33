//! Signal provider for appointments — surfaces upcoming appointments within 72h.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use rusqlite::Connection;

use crate::appointment;
use crate::db::DatabaseError;

use super::{ScoredSuggestion, SignalProvider, SuggestionIntent};

pub struct ApptSignalProvider;

impl SignalProvider for ApptSignalProvider {
    fn collect(
        &self,
        conn: &Connection,
        recent_topics: &str,
    ) -> Result<Vec<ScoredSuggestion>, DatabaseError> {
        if recent_topics.contains("appointment") || recent_topics.contains("rendez-vous") {
            return Ok(Vec::new());
        }

        let appointments = appointment::list_appointments(conn)?;
        let today = Local::now().naive_local().date();

        for appt in &appointments {
            let date = match NaiveDate::parse_from_str(&appt.date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => continue,
            };

            let days_until = (date - today).num_days();
            if days_until < 0 || days_until > 3 {
                continue;
            }

            let (template_key, score) = if days_until <= 1 {
                ("chat.suggest_appt_prepare", 1.0)
            } else {
                ("chat.suggest_appt_questions", 0.6)
            };

            let day_label = match days_until {
                0 => "today".to_string(),
                1 => "tomorrow".to_string(),
                _ => date.format("%A").to_string(),
            };

            return Ok(vec![ScoredSuggestion {
                template_key: template_key.into(),
                params: HashMap::from([("date".into(), day_label)]),
                intent: SuggestionIntent::Query,
                score,
                domain: "appointment",
                entity_id: Some(appt.id.clone()),
                category: "appointments".into(),
            }]);
        }

        Ok(Vec::new())
    }
}
