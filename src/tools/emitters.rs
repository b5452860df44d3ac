//! Result emitter tools.
//!
//! Each agent owns exactly one of these as its terminal tool: invoking it is
//! how the model commits its structured output. Handlers assemble the flat
//! argument list into the nested mapping downstream stages consume. The only
//! validation applied is what downstream invariants rely on: recommendations
//! must be one of BUY/HOLD/SELL and unit-interval scores are clamped.

use serde_json::json;

use super::{
    arg_f64, arg_str, arg_str_list, JsonMap, ParamKind, ScalarKind, ToolDef, ToolParam,
};

fn parse_recommendation(raw: &str) -> Result<String, String> {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.as_str() {
        "BUY" | "HOLD" | "SELL" => Ok(upper),
        _ => Err(format!("recommendation must be BUY, HOLD or SELL, got `{raw}`")),
    }
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn recommendation_arg(args: &JsonMap, key: &str) -> Result<String, String> {
    parse_recommendation(&arg_str(args, key))
}

// Shared parameter shorthands.
fn p_req(name: &str, kind: ParamKind, desc: &str) -> ToolParam {
    ToolParam::required(name, kind, desc)
}

fn strings(name: &str, desc: &str) -> ToolParam {
    p_req(name, ParamKind::Array(ScalarKind::String), desc)
}

fn number(name: &str, desc: &str) -> ToolParam {
    p_req(name, ParamKind::Number, desc)
}

fn text(name: &str, desc: &str) -> ToolParam {
    p_req(name, ParamKind::String, desc)
}

pub fn emit_fundamental_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_fundamental_analysis",
        "Commit the final structured result of the fundamental analysis.",
        vec![
            strings("key_findings", "Key fundamental findings"),
            text("recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            text("valuation_current_valuation", "Current valuation assessment"),
            number("valuation_target_price_min", "Low end of the fair-value range"),
            number("valuation_target_price_max", "High end of the fair-value range"),
            text("valuation_pe_assessment", "P/E assessment"),
            text("valuation_pb_assessment", "P/B assessment"),
            text("financial_overall_rating", "Overall financial health rating"),
            text("financial_debt_level", "Debt level assessment"),
            text("financial_profitability", "Profitability assessment"),
            text("growth_revenue_outlook", "Revenue growth outlook"),
            text("growth_market_position", "Market position"),
            text("growth_competitive_advantage", "Competitive advantage"),
            strings("risk_factors", "Fundamental risk factors"),
            strings("catalysts", "Upcoming catalysts"),
            text("time_short_term", "Short-term outlook"),
            text("time_long_term", "Long-term outlook"),
            text("supporting_evidence", "Evidence backing the analysis"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "recommendation")?;
            Ok(json!({
                "key_findings": arg_str_list(args, "key_findings"),
                "recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "valuation": {
                    "current_valuation": arg_str(args, "valuation_current_valuation"),
                    "target_price_min": arg_f64(args, "valuation_target_price_min"),
                    "target_price_max": arg_f64(args, "valuation_target_price_max"),
                    "pe_assessment": arg_str(args, "valuation_pe_assessment"),
                    "pb_assessment": arg_str(args, "valuation_pb_assessment"),
                },
                "financial_health": {
                    "overall_rating": arg_str(args, "financial_overall_rating"),
                    "debt_level": arg_str(args, "financial_debt_level"),
                    "profitability": arg_str(args, "financial_profitability"),
                },
                "growth_prospects": {
                    "revenue_outlook": arg_str(args, "growth_revenue_outlook"),
                    "market_position": arg_str(args, "growth_market_position"),
                    "competitive_advantage": arg_str(args, "growth_competitive_advantage"),
                },
                "risk_factors": arg_str_list(args, "risk_factors"),
                "catalysts": arg_str_list(args, "catalysts"),
                "time_horizon": {
                    "short_term": arg_str(args, "time_short_term"),
                    "long_term": arg_str(args, "time_long_term"),
                },
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_technical_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_technical_analysis",
        "Commit the final structured result of the technical analysis.",
        vec![
            strings("key_findings", "Key technical findings"),
            text("recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            text("trend_direction", "up, down or sideways"),
            text("trend_strength", "strong, moderate or weak"),
            number("levels_support_primary", "Primary support level"),
            number("levels_support_secondary", "Secondary support level"),
            number("levels_resistance_primary", "Primary resistance level"),
            number("levels_resistance_secondary", "Secondary resistance level"),
            text("signals_momentum", "Momentum signal summary"),
            text("signals_volume", "Volume signal summary"),
            text("signals_volatility", "Volatility signal summary"),
            strings("risk_factors", "Technical risk factors"),
            text("time_short_term", "Short-term view"),
            text("time_medium_term", "Medium-term view"),
            text("time_long_term", "Long-term view"),
            text("supporting_evidence", "Evidence backing the analysis"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "recommendation")?;
            Ok(json!({
                "key_findings": arg_str_list(args, "key_findings"),
                "recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "trend_direction": arg_str(args, "trend_direction"),
                "trend_strength": arg_str(args, "trend_strength"),
                "key_levels": {
                    "support": {
                        "primary": arg_f64(args, "levels_support_primary"),
                        "secondary": arg_f64(args, "levels_support_secondary"),
                    },
                    "resistance": {
                        "primary": arg_f64(args, "levels_resistance_primary"),
                        "secondary": arg_f64(args, "levels_resistance_secondary"),
                    },
                },
                "technical_signals": {
                    "momentum": arg_str(args, "signals_momentum"),
                    "volume": arg_str(args, "signals_volume"),
                    "volatility": arg_str(args, "signals_volatility"),
                },
                "risk_factors": arg_str_list(args, "risk_factors"),
                "time_horizon": {
                    "short_term": arg_str(args, "time_short_term"),
                    "medium_term": arg_str(args, "time_medium_term"),
                    "long_term": arg_str(args, "time_long_term"),
                },
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_sentiment_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_sentiment_analysis",
        "Commit the final structured result of the sentiment analysis.",
        vec![
            strings("key_findings", "Key sentiment findings"),
            text("recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            text("sentiment_level", "euphoric, optimistic, neutral, pessimistic or fearful"),
            number("sentiment_score", "Sentiment score in [0, 1], 0.5 neutral"),
            number("sentiment_magnitude", "Sentiment strength in [0, 1]"),
            strings("turning_points", "Sentiment turning points"),
            strings("contrarian_signals", "Contrarian signals"),
            strings("risk_factors", "Sentiment risk factors"),
            text("time_short_term", "Short-term sentiment outlook"),
            text("time_medium_term", "Medium-term sentiment outlook"),
            text("supporting_evidence", "Evidence backing the analysis"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "recommendation")?;
            Ok(json!({
                "key_findings": arg_str_list(args, "key_findings"),
                "recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "sentiment_level": arg_str(args, "sentiment_level"),
                "sentiment_score": unit(arg_f64(args, "sentiment_score")),
                "sentiment_magnitude": unit(arg_f64(args, "sentiment_magnitude")),
                "turning_points": arg_str_list(args, "turning_points"),
                "contrarian_signals": arg_str_list(args, "contrarian_signals"),
                "risk_factors": arg_str_list(args, "risk_factors"),
                "time_horizon": {
                    "short_term": arg_str(args, "time_short_term"),
                    "medium_term": arg_str(args, "time_medium_term"),
                },
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_news_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_news_analysis",
        "Commit the final structured result of the news analysis.",
        vec![
            strings("key_findings", "Key news findings"),
            text("recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            text("news_impact", "very positive, positive, neutral, negative or very negative"),
            number("impact_magnitude", "Impact strength in [0, 1]"),
            text("market_reaction_prediction", "Expected market reaction"),
            strings("catalyst_events", "Catalyst events"),
            strings("risk_factors", "News-driven risk factors"),
            text("time_short_term", "Short-term impact"),
            text("time_medium_term", "Medium-term impact"),
            text("supporting_evidence", "Evidence backing the analysis"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "recommendation")?;
            Ok(json!({
                "key_findings": arg_str_list(args, "key_findings"),
                "recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "news_impact": arg_str(args, "news_impact"),
                "impact_magnitude": unit(arg_f64(args, "impact_magnitude")),
                "market_reaction_prediction": arg_str(args, "market_reaction_prediction"),
                "catalyst_events": arg_str_list(args, "catalyst_events"),
                "risk_factors": arg_str_list(args, "risk_factors"),
                "time_horizon": {
                    "short_term": arg_str(args, "time_short_term"),
                    "medium_term": arg_str(args, "time_medium_term"),
                },
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_bull_research_result() -> ToolDef {
    ToolDef::sync(
        "emit_bull_research_result",
        "Commit the bull researcher's final thesis.",
        vec![
            text("bull_thesis", "Core bull thesis"),
            strings("key_bull_points", "Strongest reasons to buy"),
            number("target_price", "Target price"),
            number("upside_potential", "Upside potential in percent"),
            text("investment_horizon", "short, medium or long term"),
            strings("catalysts", "Positive catalysts"),
            strings("risk_mitigation", "Factors that soften the risks"),
            number("confidence_level", "Confidence in [0, 1]"),
            text("supporting_evidence", "Detailed argumentation"),
        ],
        |args| {
            Ok(json!({
                "bull_thesis": arg_str(args, "bull_thesis"),
                "key_bull_points": arg_str_list(args, "key_bull_points"),
                "target_price": arg_f64(args, "target_price"),
                "upside_potential": arg_f64(args, "upside_potential"),
                "investment_horizon": arg_str(args, "investment_horizon"),
                "catalysts": arg_str_list(args, "catalysts"),
                "risk_mitigation": arg_str_list(args, "risk_mitigation"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_bear_research_result() -> ToolDef {
    ToolDef::sync(
        "emit_bear_research_result",
        "Commit the bear researcher's final thesis.",
        vec![
            text("bear_thesis", "Core bear thesis"),
            strings("key_risk_points", "Strongest reasons to avoid"),
            number("target_price", "Target price"),
            number("downside_risk", "Downside risk in percent"),
            text("risk_horizon", "short, medium or long term"),
            strings("negative_catalysts", "Negative catalysts"),
            strings("structural_issues", "Structural problems"),
            number("confidence_level", "Confidence in [0, 1]"),
            text("supporting_evidence", "Detailed argumentation"),
        ],
        |args| {
            Ok(json!({
                "bear_thesis": arg_str(args, "bear_thesis"),
                "key_risk_points": arg_str_list(args, "key_risk_points"),
                "target_price": arg_f64(args, "target_price"),
                "downside_risk": arg_f64(args, "downside_risk"),
                "risk_horizon": arg_str(args, "risk_horizon"),
                "negative_catalysts": arg_str_list(args, "negative_catalysts"),
                "structural_issues": arg_str_list(args, "structural_issues"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
                "supporting_evidence": arg_str(args, "supporting_evidence"),
            }))
        },
    )
}

pub fn emit_debate_judgment() -> ToolDef {
    ToolDef::sync(
        "emit_debate_judgment",
        "Commit the final judgment over the bull/bear debate.",
        vec![
            text("decision", "BUY, HOLD or SELL"),
            number("confidence", "Decision confidence in [0, 1]"),
            text("reasoning", "Summary of the reasoning"),
            strings("supporting_factors", "Key supporting factors"),
            strings("risk_factors", "Key risk factors"),
            text("investment_strategy", "Suggested investment strategy"),
            text("winner", "bull, bear or draw"),
            strings("winning_arguments", "Arguments that carried the debate"),
        ],
        |args| {
            let decision = recommendation_arg(args, "decision")?;
            Ok(json!({
                "decision": decision,
                "confidence": unit(arg_f64(args, "confidence")),
                "reasoning": arg_str(args, "reasoning"),
                "supporting_factors": arg_str_list(args, "supporting_factors"),
                "risk_factors": arg_str_list(args, "risk_factors"),
                "investment_strategy": arg_str(args, "investment_strategy"),
                "winner": arg_str(args, "winner"),
                "winning_arguments": arg_str_list(args, "winning_arguments"),
            }))
        },
    )
}

pub fn emit_debate_quality_evaluation() -> ToolDef {
    ToolDef::sync(
        "emit_debate_quality_evaluation",
        "Commit a quality evaluation of the finished debate.",
        vec![
            text("debate_quality", "excellent, good, fair or poor"),
            number("quality_score", "Quality score in [0, 1]"),
            text("bull_argument_strength", "Assessment of the bull side"),
            text("bear_argument_strength", "Assessment of the bear side"),
            strings("key_insights", "Insights the debate surfaced"),
            text("consensus_level", "strong consensus, partial consensus or divided"),
            number("decision_confidence", "Confidence the debate supports in [0, 1]"),
            text("evaluation_summary", "Overall evaluation"),
        ],
        |args| {
            Ok(json!({
                "debate_quality": arg_str(args, "debate_quality"),
                "quality_score": unit(arg_f64(args, "quality_score")),
                "argument_strengths": {
                    "bull": arg_str(args, "bull_argument_strength"),
                    "bear": arg_str(args, "bear_argument_strength"),
                },
                "key_insights": arg_str_list(args, "key_insights"),
                "consensus_level": arg_str(args, "consensus_level"),
                "decision_confidence": unit(arg_f64(args, "decision_confidence")),
                "evaluation_summary": arg_str(args, "evaluation_summary"),
            }))
        },
    )
}

pub fn emit_trading_decision() -> ToolDef {
    ToolDef::sync(
        "emit_trading_decision",
        "Commit the trader's final decision.",
        vec![
            text("recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            number("target_price", "Target price"),
            number("stop_loss", "Stop-loss price"),
            number("take_profit", "Take-profit price"),
            number("position_size", "Target portfolio weight in [0, 1]"),
            text("time_horizon", "short, medium or long term"),
            text("reasoning", "Detailed decision rationale"),
            strings("key_factors", "Key decision factors"),
            strings("risk_factors", "Risk factors"),
            number("acceptable_price_min", "Lowest acceptable entry price"),
            number("acceptable_price_max", "Highest acceptable entry price"),
            text("execution_entry_strategy", "Entry strategy"),
            text("execution_exit_strategy", "Exit strategy"),
            strings("execution_monitoring_points", "What to monitor"),
            text("execution_contingency_plan", "Contingency plan"),
            text("market_timing", "Timing assessment"),
            text("alternatives", "Alternative courses of action"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "recommendation")?;
            let target_price = arg_f64(args, "target_price");
            let stop_loss = arg_f64(args, "stop_loss");
            let take_profit = arg_f64(args, "take_profit");
            let price_min = arg_f64(args, "acceptable_price_min");
            let price_max = arg_f64(args, "acceptable_price_max");
            if price_min > 0.0 && price_max > 0.0 && target_price > 0.0 {
                if !(price_min <= target_price && target_price <= price_max) {
                    return Err(format!(
                        "target price {target_price} must lie inside the acceptable range [{price_min}, {price_max}]"
                    ));
                }
            }
            if stop_loss > 0.0 && take_profit > 0.0 && target_price > 0.0 {
                if !(stop_loss < target_price && target_price < take_profit) {
                    return Err(format!(
                        "expected stop_loss {stop_loss} < target {target_price} < take_profit {take_profit}"
                    ));
                }
            }
            Ok(json!({
                "recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "position_size": unit(arg_f64(args, "position_size")),
                "time_horizon": arg_str(args, "time_horizon"),
                "reasoning": arg_str(args, "reasoning"),
                "key_factors": arg_str_list(args, "key_factors"),
                "risk_factors": arg_str_list(args, "risk_factors"),
                "price_range": {
                    "target_price": target_price,
                    "acceptable_min": price_min,
                    "acceptable_max": price_max,
                },
                "risk_management": {
                    "stop_loss": stop_loss,
                    "take_profit": take_profit,
                },
                "execution_plan": {
                    "entry_strategy": arg_str(args, "execution_entry_strategy"),
                    "exit_strategy": arg_str(args, "execution_exit_strategy"),
                    "monitoring_points": arg_str_list(args, "execution_monitoring_points"),
                    "contingency_plan": arg_str(args, "execution_contingency_plan"),
                },
                "market_timing": arg_str(args, "market_timing"),
                "alternatives": arg_str(args, "alternatives"),
            }))
        },
    )
}

pub fn emit_conservative_risk_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_conservative_risk_analysis",
        "Commit the conservative analyst's risk assessment.",
        vec![
            text("risk_assessment", "Overall risk assessment"),
            text("risk_level", "LOW, MEDIUM or HIGH"),
            strings("key_risks", "Main risk factors"),
            text("conservative_recommendation", "Conservative recommendation"),
            text("position_adjustment", "Suggested position adjustment"),
            strings("risk_mitigation", "Risk mitigation measures"),
            strings("alternative_strategies", "Safer alternatives"),
            strings("concerns", "Main concerns"),
            number("confidence_level", "Confidence in [0, 1]"),
        ],
        |args| {
            Ok(json!({
                "risk_assessment": arg_str(args, "risk_assessment"),
                "risk_level": arg_str(args, "risk_level").to_ascii_uppercase(),
                "key_risks": arg_str_list(args, "key_risks"),
                "conservative_recommendation": arg_str(args, "conservative_recommendation"),
                "position_adjustment": arg_str(args, "position_adjustment"),
                "risk_mitigation": arg_str_list(args, "risk_mitigation"),
                "alternative_strategies": arg_str_list(args, "alternative_strategies"),
                "concerns": arg_str_list(args, "concerns"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
            }))
        },
    )
}

pub fn emit_aggressive_opportunity_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_aggressive_opportunity_analysis",
        "Commit the aggressive analyst's opportunity assessment.",
        vec![
            text("opportunity_assessment", "Overall opportunity assessment"),
            text("upside_potential", "high, medium or low"),
            strings("key_opportunities", "Main opportunity factors"),
            text("aggressive_recommendation", "Aggressive recommendation"),
            text("position_enhancement", "Suggested position increase"),
            strings("growth_catalysts", "Growth catalysts"),
            strings("competitive_advantages", "Competitive advantages"),
            strings("timing_factors", "Timing factors"),
            number("confidence_level", "Confidence in [0, 1]"),
        ],
        |args| {
            Ok(json!({
                "opportunity_assessment": arg_str(args, "opportunity_assessment"),
                "upside_potential": arg_str(args, "upside_potential"),
                "key_opportunities": arg_str_list(args, "key_opportunities"),
                "aggressive_recommendation": arg_str(args, "aggressive_recommendation"),
                "position_enhancement": arg_str(args, "position_enhancement"),
                "growth_catalysts": arg_str_list(args, "growth_catalysts"),
                "competitive_advantages": arg_str_list(args, "competitive_advantages"),
                "timing_factors": arg_str_list(args, "timing_factors"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
            }))
        },
    )
}

pub fn emit_neutral_balance_analysis() -> ToolDef {
    ToolDef::sync(
        "emit_neutral_balance_analysis",
        "Commit the neutral analyst's balance assessment.",
        vec![
            text("balance_assessment", "Overall balance assessment"),
            text("risk_reward_ratio", "favorable, fair or unfavorable"),
            strings("key_considerations", "Main considerations"),
            text("balanced_recommendation", "Balanced recommendation"),
            text("optimal_position_size", "Suggested position size"),
            strings("timing_assessment", "Timing assessment"),
            strings("diversification_needs", "Diversification needs"),
            strings("monitoring_metrics", "Metrics to monitor"),
            number("confidence_level", "Confidence in [0, 1]"),
        ],
        |args| {
            Ok(json!({
                "balance_assessment": arg_str(args, "balance_assessment"),
                "risk_reward_ratio": arg_str(args, "risk_reward_ratio"),
                "key_considerations": arg_str_list(args, "key_considerations"),
                "balanced_recommendation": arg_str(args, "balanced_recommendation"),
                "optimal_position_size": arg_str(args, "optimal_position_size"),
                "timing_assessment": arg_str_list(args, "timing_assessment"),
                "diversification_needs": arg_str_list(args, "diversification_needs"),
                "monitoring_metrics": arg_str_list(args, "monitoring_metrics"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
            }))
        },
    )
}

pub fn emit_risk_management_decision() -> ToolDef {
    ToolDef::sync(
        "emit_risk_management_decision",
        "Commit the risk manager's adjudication of the risk debate.",
        vec![
            text("final_risk_assessment", "Overall risk assessment"),
            text("recommended_action", "BUY, HOLD or SELL"),
            text("position_adjustment", "Position adjustment"),
            text("risk_level", "LOW, MEDIUM or HIGH"),
            strings("key_risk_factors", "Key risk factors"),
            strings("risk_mitigation_measures", "Mitigation measures"),
            strings("monitoring_requirements", "Monitoring requirements"),
            strings("contingency_plans", "Contingency plans"),
            number("confidence_level", "Confidence in [0, 1]"),
            text("decision_rationale", "Detailed rationale"),
            strings("winning_arguments", "Arguments that prevailed"),
            strings("rejected_arguments", "Arguments that were rejected"),
        ],
        |args| {
            let action = recommendation_arg(args, "recommended_action")?;
            Ok(json!({
                "final_risk_assessment": arg_str(args, "final_risk_assessment"),
                "recommended_action": action,
                "position_adjustment": arg_str(args, "position_adjustment"),
                "risk_level": arg_str(args, "risk_level").to_ascii_uppercase(),
                "key_risk_factors": arg_str_list(args, "key_risk_factors"),
                "risk_mitigation_measures": arg_str_list(args, "risk_mitigation_measures"),
                "monitoring_requirements": arg_str_list(args, "monitoring_requirements"),
                "contingency_plans": arg_str_list(args, "contingency_plans"),
                "confidence_level": unit(arg_f64(args, "confidence_level")),
                "decision_rationale": arg_str(args, "decision_rationale"),
                "winning_arguments": arg_str_list(args, "winning_arguments"),
                "rejected_arguments": arg_str_list(args, "rejected_arguments"),
            }))
        },
    )
}

pub fn emit_fund_manager_decision() -> ToolDef {
    ToolDef::sync(
        "emit_fund_manager_decision",
        "Commit the fund manager's final investment decision.",
        vec![
            text("final_recommendation", "BUY, HOLD or SELL"),
            number("confidence_score", "Confidence in [0, 1]"),
            number("position_size", "Target portfolio weight in [0, 1]"),
            text("entry_strategy", "Entry strategy"),
            text("exit_strategy", "Exit strategy"),
            strings("risk_management_rules", "Risk management rules"),
            strings("key_decision_factors", "Key decision factors"),
            strings("monitoring_indicators", "Indicators to monitor"),
            text("decision_summary", "Decision summary"),
            text("next_review_date", "Next review date (YYYY-MM-DD)"),
        ],
        |args| {
            let recommendation = recommendation_arg(args, "final_recommendation")?;
            Ok(json!({
                "final_recommendation": recommendation,
                "confidence_score": unit(arg_f64(args, "confidence_score")),
                "position_size": unit(arg_f64(args, "position_size")),
                "entry_strategy": arg_str(args, "entry_strategy"),
                "exit_strategy": arg_str(args, "exit_strategy"),
                "risk_management_rules": arg_str_list(args, "risk_management_rules"),
                "key_decision_factors": arg_str_list(args, "key_decision_factors"),
                "monitoring_indicators": arg_str_list(args, "monitoring_indicators"),
                "decision_summary": arg_str(args, "decision_summary"),
                "next_review_date": arg_str(args, "next_review_date"),
            }))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{parse_arguments, ToolOutcome, ToolRegistry};

    #[tokio::test]
    async fn trading_decision_assembles_nested_payload() {
        let registry = ToolRegistry::new(vec![emit_trading_decision()]);
        let args = parse_arguments(
            r#"{
                "recommendation": "buy",
                "confidence_score": 0.72,
                "target_price": 190.0,
                "stop_loss": 170.0,
                "take_profit": 210.0,
                "position_size": 0.3,
                "time_horizon": "medium",
                "reasoning": "r",
                "key_factors": ["k"],
                "risk_factors": ["f"],
                "acceptable_price_min": 185.0,
                "acceptable_price_max": 195.0,
                "execution_entry_strategy": "scale in",
                "execution_exit_strategy": "scale out",
                "execution_monitoring_points": ["earnings"],
                "execution_contingency_plan": "cut",
                "market_timing": "now",
                "alternatives": "wait"
            }"#,
        );
        let ToolOutcome::Success(value) = registry.execute("emit_trading_decision", args).await
        else {
            panic!("expected success");
        };
        assert_eq!(value["recommendation"], "BUY");
        assert_eq!(value["price_range"]["target_price"], 190.0);
        assert_eq!(value["risk_management"]["stop_loss"], 170.0);
        assert_eq!(value["execution_plan"]["entry_strategy"], "scale in");
    }

    #[tokio::test]
    async fn trading_decision_rejects_inverted_price_band() {
        let registry = ToolRegistry::new(vec![emit_trading_decision()]);
        let args = parse_arguments(
            r#"{"recommendation": "BUY", "target_price": 100.0,
                "acceptable_price_min": 110.0, "acceptable_price_max": 120.0}"#,
        );
        assert!(matches!(
            registry.execute("emit_trading_decision", args).await,
            ToolOutcome::Failure(_)
        ));
    }

    #[tokio::test]
    async fn recommendation_is_validated() {
        let registry = ToolRegistry::new(vec![emit_fund_manager_decision()]);
        let args = parse_arguments(r#"{"final_recommendation": "YOLO"}"#);
        assert!(matches!(
            registry.execute("emit_fund_manager_decision", args).await,
            ToolOutcome::Failure(_)
        ));
    }

    #[tokio::test]
    async fn confidence_is_clamped() {
        let registry = ToolRegistry::new(vec![emit_debate_judgment()]);
        let args = parse_arguments(r#"{"decision": "HOLD", "confidence": 1.7}"#);
        let ToolOutcome::Success(value) = registry.execute("emit_debate_judgment", args).await
        else {
            panic!("expected success");
        };
        assert_eq!(value["confidence"], 1.0);
    }

    #[test]
    fn every_emitter_schema_is_well_formed() {
        let registry = ToolRegistry::new(vec![
            emit_fundamental_analysis(),
            emit_technical_analysis(),
            emit_sentiment_analysis(),
            emit_news_analysis(),
            emit_bull_research_result(),
            emit_bear_research_result(),
            emit_debate_judgment(),
            emit_debate_quality_evaluation(),
            emit_trading_decision(),
            emit_conservative_risk_analysis(),
            emit_aggressive_opportunity_analysis(),
            emit_neutral_balance_analysis(),
            emit_risk_management_decision(),
            emit_fund_manager_decision(),
        ]);
        for schema in registry.schemas() {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].as_str().unwrap().starts_with("emit_"));
            assert_eq!(schema["function"]["parameters"]["type"], "object");
        }
    }
}
