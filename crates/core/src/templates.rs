//! Email template model and rendering.
//!
//! Placeholders use the `{{NAME}}` form. Each template family exposes a
//! closed set of variables through [`TemplateVars`]; unknown placeholders are
//! left untouched in the output.

use crate::types::RegistrationEmailKind;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_COLOR_PRIMARY: &str = "#667eea";
pub const DEFAULT_COLOR_SECONDARY: &str = "#764ba2";
pub const DEFAULT_CAMPAIGN_SUBJECT: &str = "Service de garde – Inscription {{ANNEE}}";
pub const DEFAULT_CAMPAIGN_HEADER: &str = "Service de garde – Inscription";

const FOOTER: &str =
    "CDO 94 - Conseil Départemental de l'Ordre des Chirurgiens-Dentistes du Val-de-Marne";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailTemplate {
    pub subject: String,
    pub header_title: String,
    #[serde(default)]
    pub header_subtitle: String,
    pub color_primary: String,
    pub color_secondary: String,
    pub body_html: String,
}

impl Default for EmailTemplate {
    fn default() -> Self {
        Self {
            subject: DEFAULT_CAMPAIGN_SUBJECT.to_string(),
            header_title: DEFAULT_CAMPAIGN_HEADER.to_string(),
            header_subtitle: String::new(),
            color_primary: DEFAULT_COLOR_PRIMARY.to_string(),
            color_secondary: DEFAULT_COLOR_SECONDARY.to_string(),
            body_html: String::new(),
        }
    }
}

/// Subject and full HTML document ready to hand to the email provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Variable set a template family may reference.
pub trait TemplateVars {
    fn bindings(&self) -> Vec<(&'static str, &str)>;
}

/// Variables available to campaign invitations.
#[derive(Debug, Clone, Default)]
pub struct CampaignVars {
    pub last_name: String,
    pub first_name: String,
    pub year: String,
    pub registration_link: String,
    pub signer: String,
    pub admin_email: String,
}

impl TemplateVars for CampaignVars {
    fn bindings(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("NOM", &self.last_name),
            ("PRENOM", &self.first_name),
            ("ANNEE", &self.year),
            ("LIEN_INSCRIPTION", &self.registration_link),
            ("SIGNATAIRE", &self.signer),
            ("ADMIN_EMAIL", &self.admin_email),
        ]
    }
}

/// Variables available to registration confirmations and reminders.
#[derive(Debug, Clone, Default)]
pub struct RegistrationVars {
    pub last_name: String,
    pub first_name: String,
    /// Duty date, already formatted for display.
    pub duty_date: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub admin_email: String,
}

impl TemplateVars for RegistrationVars {
    fn bindings(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("NOM", &self.last_name),
            ("PRENOM", &self.first_name),
            ("DATE_GARDE", &self.duty_date),
            ("EMAIL", &self.email),
            ("TELEPHONE", &self.phone),
            ("ADRESSE", &self.address),
            ("ADMIN_EMAIL", &self.admin_email),
        ]
    }
}

fn substitute(text: &str, bindings: &[(&'static str, &str)]) -> String {
    let mut out = text.to_string();
    for (name, value) in bindings {
        out = out.replace(&format!("{{{{{name}}}}}", name = name), value);
    }
    out
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Inline the presentation styles email clients need.
fn style_body(body: &str, primary: &str) -> String {
    body.replace(
        "<p>",
        "<p style=\"margin:0 0 12px 0;color:#333;font-size:15px;line-height:1.6\">",
    )
    .replace(
        "<h3>",
        &format!("<h3 style=\"color:{primary};font-size:18px;margin:20px 0 10px 0\">"),
    )
    .replace("<ul>", "<ul style=\"margin:10px 0;padding-left:20px\">")
    .replace("<li>", "<li style=\"margin:5px 0;color:#333;font-size:15px\">")
    .replace("<a ", &format!("<a style=\"color:{primary}\" "))
}

/// Substitute variables and wrap the body in the branded HTML shell.
pub fn render<V: TemplateVars>(template: &EmailTemplate, vars: &V) -> RenderedEmail {
    let bindings = vars.bindings();
    let primary = or_default(&template.color_primary, DEFAULT_COLOR_PRIMARY);
    let secondary = or_default(&template.color_secondary, DEFAULT_COLOR_SECONDARY);

    let subject = substitute(&template.subject, &bindings);
    let title = substitute(&template.header_title, &bindings);
    let subtitle = substitute(&template.header_subtitle, &bindings);
    let body = style_body(&substitute(&template.body_html, &bindings), primary);

    let subtitle_html = if subtitle.is_empty() {
        String::new()
    } else {
        format!("<p style=\"margin:10px 0 0 0;font-size:18px\">{subtitle}</p>")
    };

    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"></head>\
<body style=\"font-family:Arial,sans-serif;line-height:1.6;color:#333;margin:0;padding:0\">\
<div style=\"max-width:600px;margin:0 auto;padding:20px\">\
<div style=\"background:linear-gradient(135deg,{primary} 0%,{secondary} 100%);color:white;padding:30px;text-align:center;border-radius:10px 10px 0 0\">\
<h1 style=\"margin:0;font-size:24px\">{title}</h1>{subtitle_html}</div>\
<div style=\"background:#f9f9f9;padding:30px;border-radius:0 0 10px 10px\">{body}</div>\
<div style=\"text-align:center;margin-top:30px;color:#666;font-size:12px\"><p>{FOOTER}</p></div>\
</div></body></html>"
    );

    RenderedEmail { subject, html }
}

const WEEKDAYS_FR: [&str; 7] = [
    "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
];
const MONTHS_FR: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// Long French date, e.g. `dimanche 3 janvier 2027`.
pub fn format_date_fr(date: NaiveDate) -> String {
    let weekday = WEEKDAYS_FR[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS_FR[date.month0() as usize];
    format!("{weekday} {} {month} {}", date.day(), date.year())
}

/// Built-in registration template for `kind`.
pub fn default_registration_template(kind: RegistrationEmailKind) -> EmailTemplate {
    match kind {
        RegistrationEmailKind::Confirmation => EmailTemplate {
            subject: "Confirmation inscription garde - {{DATE_GARDE}}".to_string(),
            header_title: "✓ Inscription confirmée".to_string(),
            header_subtitle: "Garde du {{DATE_GARDE}}".to_string(),
            color_primary: DEFAULT_COLOR_PRIMARY.to_string(),
            color_secondary: DEFAULT_COLOR_SECONDARY.to_string(),
            body_html: "<p>Bonjour Dr {{NOM}},</p>\n\
<p>Votre inscription à la garde du <strong>{{DATE_GARDE}}</strong> a bien été enregistrée.</p>\n\
<h3>📋 Vos informations</h3>\n\
<p><strong>Nom :</strong> {{NOM}} {{PRENOM}}</p>\n\
<p><strong>Email :</strong> {{EMAIL}}</p>\n\
<p><strong>Tél :</strong> {{TELEPHONE}}</p>\n\
<p><strong>Adresse :</strong> {{ADRESSE}}</p>\n\
<p>Contact : <a href=\"mailto:{{ADMIN_EMAIL}}\">{{ADMIN_EMAIL}}</a></p>"
                .to_string(),
        },
        RegistrationEmailKind::ReminderJ7 => reminder_template(
            "🟡 Rappel garde dans 7 jours - {{DATE_GARDE}}",
            "🟡 Rappel : garde dans 7 jours",
            "#f59e0b",
            "#d97706",
            "(dans 7 jours)",
        ),
        RegistrationEmailKind::ReminderJ1 => reminder_template(
            "🔴 Rappel garde DEMAIN - {{DATE_GARDE}}",
            "🔴 Rappel : garde demain",
            "#dc2626",
            "#b91c1c",
            "(<strong>demain</strong>)",
        ),
    }
}

fn reminder_template(
    subject: &str,
    title: &str,
    primary: &str,
    secondary: &str,
    when: &str,
) -> EmailTemplate {
    EmailTemplate {
        subject: subject.to_string(),
        header_title: title.to_string(),
        header_subtitle: "{{DATE_GARDE}}".to_string(),
        color_primary: primary.to_string(),
        color_secondary: secondary.to_string(),
        body_html: format!(
            "<p>Bonjour Dr {{{{NOM}}}},</p>\n\
<p>Nous vous rappelons que vous êtes inscrit(e) à la garde du <strong>{{{{DATE_GARDE}}}}</strong> {when}.</p>\n\
<h3>📋 Rappel de vos informations</h3>\n\
<p><strong>Tél :</strong> {{{{TELEPHONE}}}}</p>\n\
<p><strong>Cabinet :</strong> {{{{ADRESSE}}}}</p>\n\
<p>En cas d'empêchement, contactez-nous <strong>au plus vite</strong> à <a href=\"mailto:{{{{ADMIN_EMAIL}}}}\">{{{{ADMIN_EMAIL}}}}</a></p>"
        ),
    }
}
