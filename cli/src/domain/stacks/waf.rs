//! Regional web ACL built from AWS managed rule groups.

use anyhow::Result;

use crate::domain::config::WafConfig;
use crate::domain::edge::{EdgePolicy, EdgePolicyProps, EdgeRule, VisibilityConfig};
use crate::domain::stack::Stack;

pub const NAME: &str = "WafStack";
pub const DESCRIPTION: &str = "Web ACL guarding a regional endpoint";

const MANAGED_VENDOR: &str = "AWS";

/// Policy for `config`: one managed rule group per entry, priorities from 1
/// in list order.
///
/// # Errors
///
/// Returns an error if the scope or default action cannot be parsed or the
/// rule set is invalid.
pub fn policy(config: &WafConfig) -> Result<EdgePolicyProps> {
    let rules = config
        .managed_rule_groups
        .iter()
        .zip(1u32..)
        .map(|(group, priority)| EdgeRule::managed(MANAGED_VENDOR, group, priority))
        .collect();
    let props = EdgePolicyProps {
        name: config.name.clone(),
        scope: config.scope.parse()?,
        default_action: config.default_action.parse()?,
        visibility: VisibilityConfig::enabled(&format!("{NAME}-WebACL")),
        rules,
        association: config.association_arn.clone(),
    };
    props.validate()?;
    Ok(props)
}

/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn build(config: &WafConfig) -> Result<Stack> {
    let mut stack = Stack::new(NAME, Some(DESCRIPTION))?;
    let policy = EdgePolicy::build(&mut stack, "WebACL", &policy(config)?)?;
    stack.add_output("WebAclArn", &policy.web_acl.attr("Arn"), "ARN of the web ACL", true)?;
    Ok(stack)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_policy_has_single_managed_rule() {
        let template = build(&WafConfig::default()).unwrap().synth().unwrap();
        let acl = &template.resources["WebACL"].properties;
        assert_eq!(acl["DefaultAction"], json!({"Allow": {}}));
        assert_eq!(acl["Rules"].as_array().unwrap().len(), 1);
        assert_eq!(acl["Rules"][0]["Priority"], 1);
        assert_eq!(acl["VisibilityConfig"]["MetricName"], "WafStack-WebACL");
        assert_eq!(template.count_of_type("AWS::WAFv2::WebACLAssociation"), 0);
        assert_eq!(
            template.outputs["WebAclArn"].export.as_ref().unwrap().name,
            json!("WafStack-WebAclArn")
        );
    }

    #[test]
    fn test_priorities_follow_list_order() {
        let config = WafConfig {
            managed_rule_groups: vec![
                "AWSManagedRulesCommonRuleSet".to_string(),
                "AWSManagedRulesSQLiRuleSet".to_string(),
            ],
            ..WafConfig::default()
        };
        let props = policy(&config).unwrap();
        let priorities: Vec<u32> = props.rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 2]);
    }

    #[test]
    fn test_association_emitted_when_configured() {
        let config = WafConfig {
            association_arn: Some("arn:aws:elasticloadbalancing:ap-northeast-1:1:loadbalancer/app/a/b".to_string()),
            ..WafConfig::default()
        };
        let template = build(&config).unwrap().synth().unwrap();
        assert_eq!(template.count_of_type("AWS::WAFv2::WebACLAssociation"), 1);
    }

    #[test]
    fn test_block_default_action() {
        let config = WafConfig {
            default_action: "block".to_string(),
            ..WafConfig::default()
        };
        let template = build(&config).unwrap().synth().unwrap();
        assert_eq!(template.resources["WebACL"].properties["DefaultAction"], json!({"Block": {}}));
    }
}
