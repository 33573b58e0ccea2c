use super::*;
use pretty_assertions::assert_eq;

#[test]
fn internal_node_round_trips() {
    let node = InternalNode {
        link_to_value: Some(Pointer(42)),
        children: vec![
            Child { discriminant: b'a', pointer: Pointer(100) },
            Child { discriminant: b'z', pointer: Pointer(200) },
        ],
        capacity: 4,
    };
    let encoded = node.encode();
    assert_eq!(encoded.len(), node.encoded_len());
    let decoded = InternalNode::decode(&encoded).unwrap();
    assert_eq!(decoded, node);
}

#[test]
fn internal_node_with_no_link_round_trips() {
    let node = InternalNode { link_to_value: None, children: vec![], capacity: 4 };
    let encoded = node.encode();
    let decoded = InternalNode::decode(&encoded).unwrap();
    assert_eq!(decoded, node);
    assert_eq!(decoded.link_to_value, None);
}

#[test]
fn internal_node_rejects_unsorted_children() {
    let mut buf = vec![0u8; INTERNAL_HEADER_LEN + 2 * CHILD_ENTRY_LEN];
    buf[0] = TAG_INTERNAL;
    buf[9..11].copy_from_slice(&2u16.to_le_bytes());
    buf[11..13].copy_from_slice(&2u16.to_le_bytes());
    buf[13] = b'z';
    buf[22] = b'a';
    let err = InternalNode::decode(&buf).unwrap_err();
    assert!(matches!(err, DbError::Corruption(_)));
}

#[test]
fn internal_node_find_child_uses_binary_search() {
    let node = InternalNode {
        link_to_value: None,
        children: vec![
            Child { discriminant: b'a', pointer: Pointer(1) },
            Child { discriminant: b'm', pointer: Pointer(2) },
            Child { discriminant: b'z', pointer: Pointer(3) },
        ],
        capacity: 3,
    };
    assert_eq!(node.find_child(b'm'), Some((1, Pointer(2))));
    assert_eq!(node.find_child(b'b'), None);
    assert_eq!(node.insertion_index(b'b'), 1);
    assert_eq!(node.insertion_index(b'z'), 2);
}

#[test]
fn leaf_node_round_trips_with_slack() {
    let leaf = LeafNode { key: b"ogress".to_vec(), value: b"hi".to_vec(), value_capacity: 10 };
    let encoded = leaf.encode();
    assert_eq!(encoded.len(), leaf.encoded_len());
    let decoded = LeafNode::decode(&encoded).unwrap();
    assert_eq!(decoded, leaf);
}

#[test]
fn leaf_node_empty_key_is_a_value_only_record() {
    let leaf = LeafNode { key: vec![], value: b"v".to_vec(), value_capacity: 1 };
    let encoded = leaf.encode();
    let decoded = LeafNode::decode(&encoded).unwrap();
    assert_eq!(decoded.key, Vec::<u8>::new());
    assert_eq!(decoded.value, b"v");
}

#[test]
fn leaf_node_rejects_bad_tag() {
    let buf = vec![TAG_INTERNAL; 20];
    let err = LeafNode::decode(&buf).unwrap_err();
    assert!(matches!(err, DbError::Corruption(_)));
}

#[test]
fn leaf_peek_header_len_matches_value_offset() {
    let leaf = LeafNode { key: b"abc".to_vec(), value: b"xy".to_vec(), value_capacity: 8 };
    let encoded = leaf.encode();
    let header_len = LeafNode::peek_header_len(&encoded).unwrap();
    let mut expected_value_region = vec![0u8; leaf.value_capacity as usize];
    expected_value_region[..leaf.value.len()].copy_from_slice(&leaf.value);
    assert_eq!(&encoded[header_len..], expected_value_region.as_slice());
    assert_eq!(header_len, 1 + 8 + 3 + 4 + 4);
}

#[test]
fn generation_round_trips() {
    let encoded = encode_generation(7);
    assert_eq!(encoded.len(), GENERATION_NODE_LEN as usize);
    assert_eq!(decode_generation(&encoded).unwrap(), 7);
}

#[test]
fn generation_rejects_bad_tag() {
    let buf = vec![TAG_LEAF; GENERATION_NODE_LEN as usize];
    let err = decode_generation(&buf).unwrap_err();
    assert!(matches!(err, DbError::Corruption(_)));
}
