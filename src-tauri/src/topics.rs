// Static topic catalog shown before a conversation starts.
// Each assistant has its own list; the prompt template becomes part of the
// conversation's system instruction once the topic is picked.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt_template: &'static str,
}

pub const SECOND_BRAIN_TOPICS: &[Topic] = &[
    Topic {
        id: "brain-dump",
        label: "Brain dump",
        prompt_template: "Help the user empty their head. Capture every thought they share, then group the items into themes and surface the two or three that need attention first.",
    },
    Topic {
        id: "weekly-review",
        label: "Weekly review",
        prompt_template: "Walk the user through a weekly review: what got done, what slipped, what they learned, and what the top priorities for next week are.",
    },
    Topic {
        id: "decision",
        label: "Make a decision",
        prompt_template: "Help the user make a decision. Clarify the options, the criteria that matter to them, the reversibility of each option, and end with a recommendation they can act on.",
    },
    Topic {
        id: "goal-setting",
        label: "Goal setting",
        prompt_template: "Help the user turn a vague ambition into a concrete goal with a measurable outcome, a deadline, and the first three next actions.",
    },
];

pub const CMO_TOPICS: &[Topic] = &[
    Topic {
        id: "positioning",
        label: "Positioning",
        prompt_template: "Work on the product's positioning: the target customer, the problem, the alternatives they use today, and the one differentiator that matters most.",
    },
    Topic {
        id: "campaign",
        label: "Campaign planning",
        prompt_template: "Plan a marketing campaign end to end: objective, audience, message, channels, budget split, timeline and the metrics that decide success.",
    },
    Topic {
        id: "content",
        label: "Content strategy",
        prompt_template: "Build a content strategy: content pillars, formats, publishing cadence, and how each piece moves a reader toward becoming a customer.",
    },
    Topic {
        id: "growth",
        label: "Growth experiments",
        prompt_template: "Design growth experiments. For each idea state the hypothesis, the metric, the minimum sample, and the cost, then rank them by expected impact.",
    },
];

pub const CFO_TOPICS: &[Topic] = &[
    Topic {
        id: "cashflow",
        label: "Cashflow",
        prompt_template: "Analyse the user's cashflow: incoming and outgoing cash, timing gaps, runway, and concrete levers to extend runway or smooth the cycle.",
    },
    Topic {
        id: "fundraising",
        label: "Fundraising",
        prompt_template: "Prepare the user for fundraising: how much to raise, at what stage, which metrics investors will check, and how to structure the round.",
    },
    Topic {
        id: "pricing",
        label: "Pricing",
        prompt_template: "Work on pricing: unit economics, willingness to pay, packaging into tiers, and how a price change would affect margin and churn.",
    },
    Topic {
        id: "budget",
        label: "Budget planning",
        prompt_template: "Build a budget: fixed and variable costs, headcount plan, scenarios for best, base and worst case, and the checkpoints for revisiting it.",
    },
];

pub const COO_TOPICS: &[Topic] = &[
    Topic {
        id: "processes",
        label: "Process design",
        prompt_template: "Design or repair an operational process: map the current steps, find the bottleneck, define owners, and propose the simplest version that works.",
    },
    Topic {
        id: "hiring",
        label: "Hiring plan",
        prompt_template: "Build a hiring plan: which roles, in what order, what each hire unblocks, and how to run a structured interview process.",
    },
    Topic {
        id: "okrs",
        label: "OKRs",
        prompt_template: "Draft OKRs: a small number of ambitious objectives, measurable key results for each, and how progress gets reviewed.",
    },
    Topic {
        id: "tooling",
        label: "Tooling & automation",
        prompt_template: "Review the team's tools and find automation opportunities, ranked by hours saved per week and setup effort.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_ids_unique_per_catalog() {
        for catalog in [SECOND_BRAIN_TOPICS, CMO_TOPICS, CFO_TOPICS, COO_TOPICS] {
            let mut ids: Vec<_> = catalog.iter().map(|t| t.id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), catalog.len());
        }
    }

    #[test]
    fn test_cfo_has_cashflow() {
        assert!(CFO_TOPICS.iter().any(|t| t.id == "cashflow"));
    }
}
