use products_crm::{Company, Contact, Deal, PipelineStats, Stage, StageBoard};

/// `12345.5` -> `$12,345.50`
pub fn money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

pub fn deal_line(deal: &Deal, contacts: &[Contact], companies: &[Company]) -> String {
    format!(
        "#{:<5} {:<32} {:>14}  {:<12} {:<20} {:<20} closes {}",
        deal.id,
        deal.name,
        money(deal.value),
        deal.stage,
        deal.contact_label(contacts),
        deal.company_label(companies),
        deal.expected_close_date.format("%b %-d, %Y"),
    )
}

pub fn board(board: &StageBoard, contacts: &[Contact], companies: &[Company]) -> String {
    let mut out = String::new();
    for bucket in board.buckets() {
        out.push_str(&format!(
            "{} ({}) {}\n",
            bucket.stage,
            bucket.total_count(),
            money(bucket.total_value())
        ));
        for deal in &bucket.deals {
            out.push_str("  ");
            out.push_str(&deal_line(deal, contacts, companies));
            out.push('\n');
        }
    }
    out.push_str(&format!(
        "{} deals, {} in view\n",
        board.total_count(),
        money(board.total_value())
    ));
    out
}

pub fn stats(stats: &PipelineStats) -> String {
    let mut out = format!("Total deals: {}\n", stats.total);
    for stage in Stage::ALL {
        out.push_str(&format!("  {:<12} {}\n", stage, stats.count_for(stage)));
    }
    out.push_str(&format!("Total value: {}\n", money(stats.total_value)));
    out.push_str(&format!("Average value: {}\n", money(stats.avg_value)));
    out
}
