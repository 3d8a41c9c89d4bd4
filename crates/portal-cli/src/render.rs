//! Terminal rendering

use colored::*;
use hospital_portal_core::model::{AccessLogEntry, Appointment, AuditLogEntry, Page, Provider, TimeSlot};
use hospital_portal_core::records::{PatientSummary, TabView};
use hospital_portal_core::workflow::{Notification, NotificationLevel};
use hospital_portal_core::ValidationResult;

pub fn banner(title: &str) {
    println!("{}", "═".repeat(60).cyan());
    println!("{}", format!("  {}", title).cyan().bold());
    println!("{}", "═".repeat(60).cyan());
}

pub fn section(title: &str) {
    println!("{}", "─".repeat(60));
    println!("{}", title.green().bold());
    println!("{}", "─".repeat(60));
}

pub fn notifications(items: Vec<Notification>) {
    for n in items {
        let tag = match n.level {
            NotificationLevel::Success => "✓".green().bold(),
            NotificationLevel::Info => "i".blue().bold(),
            NotificationLevel::Warning => "!".yellow().bold(),
            NotificationLevel::Error => "✗".red().bold(),
        };
        println!("{} {}", tag, n.message);
    }
}

pub fn field_errors(result: &ValidationResult) {
    for e in &result.errors {
        eprintln!("  {} {}: {}", "✗".red(), e.field.bold(), e.message);
    }
}

pub fn summary(summary: &PatientSummary) {
    section("PATIENT");
    println!("  {:<16} {}", "Name:", summary.full_name.bold());
    println!("  {:<16} {}", "Card number:", summary.card_number);
    println!(
        "  {:<16} {}",
        "Date of birth:",
        summary.date_of_birth.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    if let Some(age) = summary.age {
        println!("  {:<16} {}", "Age:", age);
    }
    if let Some(gender) = &summary.gender {
        println!("  {:<16} {}", "Gender:", gender);
    }
    println!();
    println!("{}", "  Full record requires identity verification.".dimmed());
}

pub fn tab(view: &TabView) {
    section(&view.tab.title().to_uppercase());
    if view.is_empty() {
        println!("  {}", "No entries".dimmed());
        return;
    }
    let widths: Vec<usize> = view
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            view.rows
                .iter()
                .map(|r| r.get(i).map_or(0, |c| c.chars().count()))
                .max()
                .unwrap_or(0)
                .max(h.len())
        })
        .collect();

    let header: Vec<String> = view
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<w$}", h, w = *w))
        .collect();
    println!("  {}", header.join("  ").bold());
    for row in &view.rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect();
        println!("  {}", cells.join("  "));
    }
}

pub fn audit_page(page: &Page<AuditLogEntry>) {
    section(&format!(
        "AUDIT LOG (page {} of {}, {} entries)",
        page.current_page.saturating_add(1),
        page.total_pages.max(1),
        page.total_items
    ));
    for e in &page.content {
        let outcome = if e.granted { "granted".green() } else { "denied".red() };
        println!(
            "  {}  {:<14} {:<12} {}#{}  {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.username,
            e.action.as_str(),
            e.entity_type,
            e.entity_id.as_deref().unwrap_or("-"),
            outcome
        );
    }
    if page.has_more() {
        println!("{}", format!("  More entries: --page {}", page.current_page.saturating_add(1)).dimmed());
    }
}

pub fn access_logs(entries: &[AccessLogEntry]) {
    section(&format!("ACCESS LOG ({} entries)", entries.len()));
    for e in entries {
        println!(
            "  {}  patient {:<6} {:<14} {:<12} {}",
            e.accessed_at.format("%Y-%m-%d %H:%M:%S"),
            e.patient_id,
            e.staff_username,
            e.action.as_str(),
            e.purpose.as_deref().unwrap_or("-")
        );
    }
}

pub fn providers(providers: &[Provider]) {
    section("PROVIDERS");
    for p in providers {
        println!(
            "  {:<5} {:<24} {:<22} {}",
            p.id,
            p.name,
            p.specialty,
            p.department.as_deref().unwrap_or("-")
        );
    }
}

pub fn slots(slots: &[TimeSlot]) {
    section("TIME SLOTS");
    if slots.is_empty() {
        println!("  {}", "No slots on this date".dimmed());
    }
    for s in slots {
        let status = if s.available { "available".green() } else { "booked".red() };
        println!(
            "  {:<6} {} - {}  {}",
            s.id,
            s.start_time.format("%Y-%m-%d %H:%M"),
            s.end_time.format("%H:%M"),
            status
        );
    }
}

pub fn appointment(a: &Appointment) {
    section("APPOINTMENT");
    println!("  {:<12} {}", "Id:", a.id);
    println!("  {:<12} {}", "Patient:", a.patient_id);
    println!("  {:<12} {}", "Provider:", a.provider_id);
    if let Some(start) = a.start_time {
        println!("  {:<12} {}", "Time:", start.format("%Y-%m-%d %H:%M"));
    }
    println!("  {:<12} {:?}", "Status:", a.status);
}
