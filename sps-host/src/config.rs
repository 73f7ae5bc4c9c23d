use sps_types::topic::{QoS, Topic, TopicFilter};

/// A part of the Sparkplug namespace to subscribe to
#[derive(Debug, Clone)]
pub enum NamespaceSubConfig {
    Group { group_id: String },
    Node { group_id: String, node_id: String },
}

impl From<NamespaceSubConfig> for TopicFilter {
    fn from(value: NamespaceSubConfig) -> Self {
        match value {
            NamespaceSubConfig::Group { group_id } => {
                TopicFilter::new_with_qos(Topic::Group { id: group_id }, QoS::AtMostOnce)
            }
            NamespaceSubConfig::Node { group_id, node_id } => TopicFilter::new_with_qos(
                Topic::Node { group_id, node_id },
                QoS::AtMostOnce,
            ),
        }
    }
}

/// Which edge nodes a [HostApplication](crate::HostApplication) tracks
#[derive(Debug, Clone)]
pub enum SubscriptionConfig {
    AllGroups,
    SingleGroup { group_id: String },
    Custom(Vec<NamespaceSubConfig>),
}

impl From<SubscriptionConfig> for Vec<TopicFilter> {
    fn from(value: SubscriptionConfig) -> Self {
        match value {
            SubscriptionConfig::AllGroups => {
                vec![TopicFilter::new_with_qos(Topic::Namespace, QoS::AtMostOnce)]
            }
            SubscriptionConfig::SingleGroup { group_id } => vec![TopicFilter::new_with_qos(
                Topic::Group { id: group_id },
                QoS::AtMostOnce,
            )],
            SubscriptionConfig::Custom(namespace_sub_configs) => namespace_sub_configs
                .into_iter()
                .map(TopicFilter::from)
                .collect(),
        }
    }
}
