//! Ownership, news and filings, earnings and analyst coverage.

use super::{card, fmt_big, fmt_num, fmt_pct, stock_actions, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{CardType, Chart, ChartType, Intent, ResolvedSymbol},
    error::Result,
    repository::{CorporateActionRow, PeriodType, StatementKind},
    utils::{json_f64, num, pct_change},
};
use serde_json::{json, Value};

const NEWS_TYPES: &[&str] = &["news", "announcement", "disclosure"];
const AGM_TYPES: &[&str] = &["agm", "egm"];
const ACTION_TYPES: &[&str] = &["dividend", "split", "rights_issue", "bonus_shares", "buyback", "capital_increase"];

pub async fn ownership(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let holders = ctx.repo.shareholders(&symbol.symbol).await?;
    let name = ctx.name(symbol);
    if holders.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("No shareholder data is recorded for {}.", name),
            format!("لا توجد بيانات مساهمين لـ {}.", name),
        ))
        .actions(stock_actions(&symbol.symbol, Intent::Ownership)));
    }

    let holder_name = |h: &crate::repository::ShareholderRow| {
        if ctx.ar() {
            h.holder_name_ar.clone().unwrap_or_else(|| h.holder_name.clone())
        } else {
            h.holder_name.clone()
        }
    };
    let listed: f64 = holders.iter().filter_map(|h| h.ownership_percent).sum();
    let mut series: Vec<Value> = holders
        .iter()
        .filter(|h| h.ownership_percent.is_some())
        .map(|h| json!({"label": holder_name(h), "value": num(h.ownership_percent)}))
        .collect();
    if listed < 99.5 {
        series.push(json!({"label": ctx.t("Other", "أخرى"), "value": num(Some(100.0 - listed))}));
    }
    let top = &holders[0];

    Ok(HandlerResult::ok(ctx.t(
        format!(
            "The largest holder of {} is {} with {}%.",
            name,
            holder_name(top),
            fmt_num(top.ownership_percent, 2)
        ),
        format!(
            "أكبر مساهم في {} هو {} بنسبة {}%.",
            name,
            holder_name(top),
            fmt_num(top.ownership_percent, 2)
        ),
    ))
    .card(card(
        CardType::Ownership,
        ctx.t("Shareholders", "المساهمون"),
        json!({
            "symbol": symbol.symbol,
            "as_of": top.as_of_date,
            "holders": holders.iter().map(|h| json!({
                "name": holder_name(h),
                "ownership_percent": num(h.ownership_percent),
                "shares": num(h.shares),
            })).collect::<Vec<_>>(),
        }),
    ))
    .chart(
        Chart::new(ChartType::Pie, ctx.t("Ownership structure", "هيكل الملكية"))
            .symbol(&symbol.symbol)
            .series(series),
    )
    .actions(stock_actions(&symbol.symbol, Intent::Ownership)))
}

fn news_item(row: &CorporateActionRow) -> Value {
    json!({
        "type": row.action_type,
        "title": row.title,
        "description": row.description,
        "date": row.announcement_date,
        "ex_date": row.ex_date,
        "value": num(row.value),
    })
}

/// NEWS, AGM and CORPORATE_ACTIONS differ only in the action types read.
pub async fn filings(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> Result<HandlerResult> {
    let (types, title) = match intent {
        Intent::Agm => (AGM_TYPES, ctx.t("General assemblies", "الجمعيات العمومية")),
        Intent::CorporateActions => (ACTION_TYPES, ctx.t("Corporate actions", "إجراءات الشركة")),
        _ => (NEWS_TYPES, ctx.t("Latest news", "آخر الأخبار")),
    };
    let rows = ctx.repo.corporate_actions(&symbol.symbol, types, 10).await?;
    let name = ctx.name(symbol);
    if rows.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("Nothing recent on file for {}.", name),
            format!("لا يوجد جديد مسجل لـ {}.", name),
        ))
        .actions(stock_actions(&symbol.symbol, intent)));
    }
    let headline = rows[0].title.clone().unwrap_or_else(|| rows[0].action_type.clone());
    Ok(HandlerResult::ok(ctx.t(
        format!("{} items for {}. Most recent: {}.", rows.len(), name, headline),
        format!("{} عنصر لـ {}. الأحدث: {}.", rows.len(), name, headline),
    ))
    .card(card(
        CardType::NewsList,
        title,
        json!({"symbol": symbol.symbol, "items": rows.iter().map(news_item).collect::<Vec<_>>()}),
    ))
    .actions(stock_actions(&symbol.symbol, intent)))
}

/// Latest quarter against the same quarter a year earlier when available,
/// else against the previous quarter.
pub async fn earnings(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let quarters = ctx
        .repo
        .statements(StatementKind::Income, &symbol.symbol, PeriodType::Quarterly, 5)
        .await?;
    let name = ctx.name(symbol);
    let Some(latest) = quarters.first() else {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("No quarterly results are available for {}.", name),
            format!("لا توجد نتائج ربع سنوية لـ {}.", name),
        )));
    };
    let prior = quarters
        .iter()
        .find(|q| q.fiscal_year == latest.fiscal_year - 1 && q.fiscal_quarter == latest.fiscal_quarter)
        .or_else(|| quarters.get(1));

    let field = |row: &crate::repository::StatementRow, key: &str| row.fields().and_then(|f| json_f64(f, key));
    let rows: Vec<Value> = [
        ("total_revenue", "Revenue", "الإيرادات"),
        ("net_income", "Net Income", "صافي الربح"),
        ("eps", "EPS", "ربحية السهم"),
    ]
    .into_iter()
    .map(|(key, en, ar)| {
        let now = field(latest, key);
        let before = prior.and_then(|p| field(p, key));
        json!({
            "key": key,
            "label": if ctx.ar() { ar } else { en },
            "current": num(now),
            "prior": num(before),
            "change_pct": num(now.zip(before).and_then(|(n, b)| pct_change(b, n))),
        })
    })
    .collect();

    let net_now = field(latest, "net_income");
    let net_change = prior
        .and_then(|p| field(p, "net_income"))
        .zip(net_now)
        .and_then(|(b, n)| pct_change(b, n));

    Ok(HandlerResult::ok(ctx.t(
        format!(
            "{} earned {} in {} ({} vs {}).",
            name,
            fmt_big(net_now),
            latest.period_label(),
            fmt_pct(net_change),
            prior.map(|p| p.period_label()).unwrap_or_else(|| "-".into())
        ),
        format!(
            "حققت {} صافي ربح {} في {} ({} مقارنة بـ {}).",
            name,
            fmt_big(net_now),
            latest.period_label(),
            fmt_pct(net_change),
            prior.map(|p| p.period_label()).unwrap_or_else(|| "-".into())
        ),
    ))
    .card(card(
        CardType::FinancialsTable,
        ctx.t("Latest earnings", "آخر نتائج أعمال"),
        json!({
            "symbol": symbol.symbol,
            "period": latest.period_label(),
            "compared_with": prior.map(|p| p.period_label()),
            "rows": rows,
        }),
    ))
    .actions(stock_actions(&symbol.symbol, Intent::Earnings)))
}

pub async fn analyst_ratings(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let ratings = ctx.repo.analyst_ratings(&symbol.symbol, 10).await?;
    let name = ctx.name(symbol);
    if ratings.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("No analyst coverage is recorded for {}.", name),
            format!("لا توجد تغطية من المحللين لـ {}.", name),
        ))
        .actions(stock_actions(&symbol.symbol, Intent::AnalystRatings)));
    }
    let price = ctx.repo.ticker(&symbol.symbol).await?.and_then(|t| t.last_price);
    let targets: Vec<f64> = ratings.iter().filter_map(|r| r.target_price).collect();
    let consensus = (!targets.is_empty()).then(|| targets.iter().sum::<f64>() / targets.len() as f64);
    let upside = consensus.zip(price).and_then(|(c, p)| pct_change(p, c));

    Ok(HandlerResult::ok(ctx.t(
        format!(
            "{} analysts cover {}; average target {} ({} from the last price).",
            ratings.len(),
            name,
            fmt_num(consensus, 2),
            fmt_pct(upside)
        ),
        format!(
            "يغطي {} محللين سهم {}؛ متوسط السعر المستهدف {} ({} عن آخر سعر).",
            ratings.len(),
            name,
            fmt_num(consensus, 2),
            fmt_pct(upside)
        ),
    ))
    .card(card(
        CardType::FairValue,
        ctx.t("Analyst ratings", "تقييمات المحللين"),
        json!({
            "symbol": symbol.symbol,
            "last_price": num(price),
            "consensus_target": num(consensus),
            "upside_pct": num(upside),
            "ratings": ratings,
        }),
    ))
    .actions(stock_actions(&symbol.symbol, Intent::AnalystRatings)))
}
