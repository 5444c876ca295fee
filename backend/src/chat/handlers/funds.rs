//! Mutual funds: NAV history, listing and movers.

use super::{card, fmt_num, fmt_pct, market::since, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{Action, CardType, Chart, ChartType, DataSource, Direction, Range, ResolvedSymbol},
    error::Result,
    repository::FundRow,
    utils::{num, pct_change},
};
use serde_json::{json, Value};

fn fund_name(fund: &FundRow, arabic: bool) -> String {
    let name = if arabic {
        fund.name_ar.as_ref().or(fund.name_en.as_ref())
    } else {
        fund.name_en.as_ref().or(fund.name_ar.as_ref())
    };
    name.cloned().unwrap_or_else(|| fund.fund_id.clone())
}

fn fund_row(fund: &FundRow, arabic: bool) -> Value {
    json!({
        "fund_id": fund.fund_id,
        "symbol": fund.symbol,
        "name": fund_name(fund, arabic),
        "manager": fund.manager_name,
        "currency": fund.currency,
        "last_nav": num(fund.last_nav),
        "nav_change_percent": num(fund.nav_change_percent),
        "ytd_return": num(fund.ytd_return),
        "one_year_return": num(fund.one_year_return),
        "last_nav_date": fund.last_nav_date,
    })
}

fn nav_action(fund: &FundRow) -> Action {
    let key = fund.symbol.clone().unwrap_or_else(|| fund.fund_id.clone());
    Action::query(key.clone(), key.clone(), format!("NAV of {}", key))
}

pub async fn nav(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let Some(fund) = ctx.repo.fund(&symbol.symbol).await? else {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("I couldn't find a fund matching {}.", symbol.symbol),
            format!("لم أجد صندوقا باسم {}.", symbol.symbol),
        )));
    };
    let range = ctx.range_or(Range::ThreeMonths);
    let history = ctx.repo.nav_history(&fund.fund_id, since(range)).await?;
    let period_return = match (history.first(), history.last()) {
        (Some(first), Some(last)) if history.len() > 1 => pct_change(first.nav, last.nav),
        _ => None,
    };
    let name = fund_name(&fund, ctx.ar());

    let mut result = HandlerResult::ok(ctx.t(
        format!(
            "{} NAV is {} {} ({} over {}).",
            name,
            fmt_num(fund.last_nav, 4),
            fund.currency.as_deref().unwrap_or(""),
            fmt_pct(period_return),
            range
        ),
        format!(
            "صافي قيمة أصول {} هو {} {} ({} خلال {}).",
            name,
            fmt_num(fund.last_nav, 4),
            fund.currency.as_deref().unwrap_or(""),
            fmt_pct(period_return),
            range
        ),
    ))
    .card(card(
        CardType::FundNav,
        name.clone(),
        json!({
            "fund": fund_row(&fund, ctx.ar()),
            "range": range,
            "period_return": num(period_return),
        }),
    ));

    if !history.is_empty() {
        let series = history
            .iter()
            .map(|p| json!({"date": p.date, "value": num(Some(p.nav))}))
            .collect();
        result = result.chart(
            Chart::new(ChartType::Line, ctx.t("NAV history", "تاريخ صافي قيمة الأصول"))
                .symbol(fund.symbol.as_deref().unwrap_or(&fund.fund_id))
                .range(range)
                .series(series)
                .source(DataSource::Database),
        );
    }
    Ok(result.actions(vec![
        Action::query("All funds", "كل الصناديق", "List mutual funds"),
        Action::query("Fund movers", "حركة الصناديق", "Top performing funds today"),
    ]))
}

pub async fn list(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let funds = ctx.repo.funds(ctx.entities.market_code, 20).await?;
    if funds.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t("No funds are listed yet.", "لا توجد صناديق مدرجة حاليا.")));
    }
    Ok(HandlerResult::ok(ctx.t(
        format!("{} funds, best year-to-date first.", funds.len()),
        format!("{} صندوق، الأفضل أداء منذ بداية العام أولا.", funds.len()),
    ))
    .card(card(
        CardType::FundList,
        ctx.t("Mutual funds", "صناديق الاستثمار"),
        json!({"rows": funds.iter().map(|f| fund_row(f, ctx.ar())).collect::<Vec<_>>()}),
    ))
    .actions(funds.iter().take(3).map(nav_action).collect()))
}

pub async fn movers(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let direction = ctx.entities.direction.unwrap_or(Direction::Desc);
    let funds = ctx.repo.fund_movers(direction, 10).await?;
    if funds.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t("No fund NAV changes recorded yet.", "لا توجد تغيرات مسجلة للصناديق.")));
    }
    let leaders: Vec<String> = funds
        .iter()
        .take(3)
        .map(|f| format!("{} ({})", fund_name(f, ctx.ar()), fmt_pct(f.nav_change_percent)))
        .collect();
    Ok(HandlerResult::ok(leaders.join(", "))
        .card(card(
            CardType::FundMovers,
            ctx.t("Fund movers", "حركة الصناديق"),
            json!({
                "direction": direction.as_str(),
                "rows": funds.iter().map(|f| fund_row(f, ctx.ar())).collect::<Vec<_>>(),
            }),
        ))
        .actions(funds.iter().take(3).map(nav_action).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{
            handlers::testing::{card_of, ctx},
            schema::{Entities, EntityType, Language, MatchType},
        },
        repository::memory::MemoryRepository,
    };

    fn fund(symbol: &str) -> ResolvedSymbol {
        ResolvedSymbol {
            symbol: symbol.to_string(),
            name_en: None,
            name_ar: None,
            market_code: None,
            entity_type: EntityType::Fund,
            match_type: MatchType::Alias,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn nav_by_fund_id_or_symbol() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        for key in ["EGF-101", "FAWRYMM"] {
            let r = nav(&c, &fund(key)).await.unwrap();
            assert!(card_of(&r, CardType::FundNav).is_some());
            let chart = r.chart.unwrap();
            assert_eq!(chart.chart_type, ChartType::Line);
            assert_eq!(chart.range, Some(Range::ThreeMonths));
            assert!(chart.series.len() > 80);
        }
    }

    #[tokio::test]
    async fn fund_without_history_has_no_chart() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = nav(&c, &fund("EGF-202")).await.unwrap();
        assert!(r.chart.is_none());
        assert!(r.error_code.is_none());
    }

    #[tokio::test]
    async fn list_and_movers() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = list(&c).await.unwrap();
        let rows = &card_of(&r, CardType::FundList).unwrap()["data"]["rows"];
        assert_eq!(rows[0]["fund_id"], "EGF-202");

        let r = movers(&c).await.unwrap();
        let rows = &card_of(&r, CardType::FundMovers).unwrap()["data"]["rows"];
        assert_eq!(rows[0]["fund_id"], "EGF-101");
        assert_eq!(r.actions[0].payload, "NAV of FAWRYMM");
    }
}
